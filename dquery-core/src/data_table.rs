//! Columnar table of heterogeneous records.
//!
//! Columns keep insertion order, rows keep append order, and a row index is
//! the only identity a record has. Cells a row never received hold the
//! [`NOT_SET`] sentinel until they are read, at which point they resolve to
//! the table's not-set value (`Value::Null` by default).
//!
//! ```
//! use dquery_core::{record, DataTable, Value};
//!
//! let mut table = DataTable::new();
//! table.add_record(record! { "a" => 1 }).unwrap();
//! table.add_record(record! { "a" => 2, "b" => "x" }).unwrap();
//!
//! assert!(table.is_normalized());
//! assert_eq!(table.get_record(0).unwrap().get("b"), Some(&Value::Null));
//! ```

use crate::record::{FromRecord, IntoRecord, Record};
use crate::sentinel::{Sentinel, NOT_SET};
use crate::{Error, Result, Value};
use serde::ser::{Error as _, Serialize, SerializeMap, Serializer};
use std::collections::HashSet;

/// One table cell: a value, or a sentinel marking "no value for this row".
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Set(Value),
    NotSet(Sentinel),
}

impl Cell {
    pub fn not_set() -> Self {
        Cell::NotSet(NOT_SET)
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Cell::Set(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Cell::Set(v) => Some(v),
            Cell::NotSet(_) => None,
        }
    }

    pub fn resolve(&self, not_set_value: &Value) -> Value {
        match self {
            Cell::Set(v) => v.clone(),
            Cell::NotSet(_) => not_set_value.clone(),
        }
    }
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        Cell::Set(value)
    }
}

/// Sentinels never leave the process: serializing one is an error.
impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Cell::Set(v) => v.serialize(serializer),
            Cell::NotSet(sentinel) => Err(S::Error::custom(format!(
                "{} cell cannot be serialized, resolve it first",
                sentinel
            ))),
        }
    }
}

/// Mapping of column name to equal-length cell sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    columns: Vec<(String, Vec<Cell>)>,
    not_set_value: Value,
}

impl Default for DataTable {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            not_set_value: Value::Null,
        }
    }
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table from an initial column mapping. Columns are not padded.
    pub fn create<I, K, V>(columns: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut table = Self::new();
        table.extend(columns);
        table
    }

    /// Table with one row per record.
    pub fn from_records<I, R>(records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoRecord,
    {
        let mut table = Self::new();
        for record in records {
            table.push_row(record.into_record());
        }
        table
    }

    /// Value that not-set cells resolve to when read.
    pub fn with_not_set_value(mut self, value: Value) -> Self {
        self.not_set_value = value;
        self
    }

    pub fn not_set_value(&self) -> &Value {
        &self.not_set_value
    }

    pub fn resolve_not_set_value(&self, cell: &Cell) -> Value {
        cell.resolve(&self.not_set_value)
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|(k, _)| k == name)
    }

    fn column_mut(&mut self, name: &str) -> &mut Vec<Cell> {
        let index = match self.column_index(name) {
            Some(i) => i,
            None => {
                self.columns.push((name.to_string(), Vec::new()));
                self.columns.len() - 1
            }
        };
        &mut self.columns[index].1
    }

    fn cells(&self, name: &str) -> Option<&[Cell]> {
        self.column_index(name).map(|i| self.columns[i].1.as_slice())
    }

    /// Appends values column by column, creating missing columns.
    pub fn extend<I, K, V>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, values) in columns {
            let key = key.into();
            self.column_mut(&key)
                .extend(values.into_iter().map(|v| Cell::Set(v.into())));
        }
        self
    }

    /// Appends values to a single column, creating it when missing.
    pub fn append<V: Into<Value>>(&mut self, key: &str, values: Vec<V>) -> &mut Self {
        self.column_mut(key)
            .extend(values.into_iter().map(|v| Cell::Set(v.into())));
        self
    }

    pub fn get_lengths(&self) -> Vec<usize> {
        self.columns.iter().map(|(_, cells)| cells.len()).collect()
    }

    pub fn max_length(&self) -> usize {
        self.get_lengths().into_iter().max().unwrap_or(0)
    }

    pub fn min_length(&self) -> usize {
        self.get_lengths().into_iter().min().unwrap_or(0)
    }

    /// Row count; equals `max_length`.
    pub fn len(&self) -> usize {
        self.max_length()
    }

    pub fn is_empty(&self) -> bool {
        self.max_length() == 0
    }

    pub fn is_normalized(&self) -> bool {
        self.min_length() == self.max_length()
    }

    /// Pads every column to the longest one with not-set cells.
    pub fn normalize(&mut self) -> &mut Self {
        self.pad_to(self.max_length());
        self
    }

    fn ensure_normalized(&self, action: &str) -> Result<()> {
        if self.is_normalized() {
            Ok(())
        } else {
            Err(Error::DataTable(format!(
                "Cannot {} not normalized table, column lengths are {:?}. Use `normalize` method.",
                action,
                self.get_lengths()
            )))
        }
    }

    /// New table with only the named columns; unknown names are ignored.
    pub fn filter_keys<S: AsRef<str>>(&self, keys: &[S]) -> DataTable {
        DataTable {
            columns: self
                .columns
                .iter()
                .filter(|(k, _)| keys.iter().any(|key| key.as_ref() == k))
                .cloned()
                .collect(),
            not_set_value: self.not_set_value.clone(),
        }
    }

    fn row_unchecked(&self, index: usize) -> Record {
        self.columns
            .iter()
            .map(|(k, cells)| (k.clone(), cells[index].resolve(&self.not_set_value)))
            .collect()
    }

    fn row_cells(&self, index: usize) -> impl Iterator<Item = (&str, &Cell)> {
        self.columns
            .iter()
            .map(move |(k, cells)| (k.as_str(), &cells[index]))
    }

    /// Row `index` with not-set cells resolved.
    pub fn get_record(&self, index: usize) -> Result<Record> {
        self.ensure_normalized("get record from")?;
        if index >= self.max_length() {
            return Err(Error::DataTable(format!(
                "Record index {} is out of range, table has {} records",
                index,
                self.max_length()
            )));
        }
        Ok(self.row_unchecked(index))
    }

    /// Row `index` without its not-set cells.
    pub fn get_set_record(&self, index: usize) -> Result<Record> {
        self.get_record(index)?;
        Ok(self
            .row_cells(index)
            .filter_map(|(k, cell)| cell.as_value().map(|v| (k, v.clone())))
            .collect())
    }

    /// Row-major view over the whole table.
    pub fn get_records(&self) -> Result<Records<'_>> {
        self.ensure_normalized("get records from")?;
        Ok(Records {
            table: self,
            index: 0,
            end: self.max_length(),
        })
    }

    pub fn get_typed_record<T: FromRecord>(&self, index: usize) -> Result<T> {
        T::from_record(&self.get_record(index)?)
    }

    pub fn get_typed_records<T: FromRecord>(&self) -> Result<Vec<T>> {
        self.get_records()?.map(|r| T::from_record(&r)).collect()
    }

    fn push_row(&mut self, record: Record) {
        let length = self.max_length();
        for (key, value) in record {
            let column = self.column_mut(&key);
            column.resize(length, Cell::not_set());
            column.push(Cell::Set(value));
        }
        self.pad_to(length + 1);
    }

    fn pad_to(&mut self, length: usize) {
        for (_, cells) in self.columns.iter_mut() {
            cells.resize(length, Cell::not_set());
        }
    }

    /// Appends one row, back-filling new columns and padding absent ones.
    pub fn add_record<R: IntoRecord>(&mut self, record: R) -> Result<&mut Self> {
        self.ensure_normalized("add record to")?;
        self.push_row(record.into_record());
        Ok(self)
    }

    pub fn add_records<I, R>(&mut self, records: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = R>,
        R: IntoRecord,
    {
        self.ensure_normalized("add records to")?;
        for record in records {
            self.push_row(record.into_record());
        }
        Ok(self)
    }

    /// New table with rows whose values match every `query` entry.
    ///
    /// A match is equality, membership of the row value in a list query
    /// value, or membership of the query value in a list row value.
    pub fn filter_records(&self, query: &Record) -> Result<DataTable> {
        self.ensure_normalized("filter")?;
        let mut result = DataTable {
            columns: self
                .columns
                .iter()
                .map(|(k, _)| (k.clone(), Vec::new()))
                .collect(),
            not_set_value: self.not_set_value.clone(),
        };

        for index in 0..self.max_length() {
            let matched = query.iter().all(|(key, expected)| {
                let actual = match self.cells(key) {
                    Some(cells) => cells[index].resolve(&self.not_set_value),
                    None => self.not_set_value.clone(),
                };
                values_match(&actual, expected)
            });
            if matched {
                result.copy_row_from(self, index);
            }
        }
        Ok(result)
    }

    fn copy_row_from(&mut self, other: &DataTable, index: usize) {
        let length = self.max_length();
        for (key, cell) in other.row_cells(index) {
            let column = self.column_mut(key);
            column.resize(length, Cell::not_set());
            column.push(cell.clone());
        }
        self.pad_to(length + 1);
    }

    /// Appends the rows of other normalized tables, keeping not-set cells.
    pub fn add_table(&mut self, others: &[&DataTable]) -> Result<&mut Self> {
        self.ensure_normalized("add table to")?;
        if let Some(position) = others.iter().position(|t| !t.is_normalized()) {
            return Err(Error::DataTable(format!(
                "Cannot add not normalized table #{}, column lengths are {:?}",
                position,
                others[position].get_lengths()
            )));
        }
        for other in others {
            for index in 0..other.max_length() {
                self.copy_row_from(other, index);
            }
        }
        Ok(self)
    }

    /// Drops rows repeating an earlier row on `keys`, strings compared
    /// case-insensitively. Empty `keys` compares whole rows.
    pub fn drop_duplicates<S: AsRef<str>>(&self, keys: &[S]) -> Result<DataTable> {
        self.drop_duplicates_with(keys, true)
    }

    pub fn drop_duplicates_with<S: AsRef<str>>(
        &self,
        keys: &[S],
        case_insensitive: bool,
    ) -> Result<DataTable> {
        self.ensure_normalized("drop duplicates from")?;
        let names: Vec<String> = if keys.is_empty() {
            self.columns.iter().map(|(k, _)| k.clone()).collect()
        } else {
            keys.iter().map(|k| k.as_ref().to_string()).collect()
        };

        let mut seen = HashSet::new();
        let mut result = DataTable {
            columns: self
                .columns
                .iter()
                .map(|(k, _)| (k.clone(), Vec::new()))
                .collect(),
            not_set_value: self.not_set_value.clone(),
        };
        for index in 0..self.max_length() {
            let mut fingerprint = Vec::with_capacity(names.len());
            for name in &names {
                let value = match self.cells(name) {
                    Some(cells) => cells[index].resolve(&self.not_set_value),
                    None => self.not_set_value.clone(),
                };
                let value = if case_insensitive {
                    value.to_lowercase()
                } else {
                    value
                };
                fingerprint.push(crate::json::dumps_value(&value)?);
            }
            if seen.insert(fingerprint) {
                result.copy_row_from(self, index);
            }
        }
        Ok(result)
    }

    /// Resolved column values; an unknown column resolves every row.
    pub fn get_column(&self, name: &str) -> Result<Vec<Value>> {
        self.ensure_normalized("get column from")?;
        Ok(match self.cells(name) {
            Some(cells) => cells
                .iter()
                .map(|c| c.resolve(&self.not_set_value))
                .collect(),
            None => vec![self.not_set_value.clone(); self.max_length()],
        })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn has_columns<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names.iter().all(|n| self.has_column(n.as_ref()))
    }

    /// True when the column exists and no cell in it is not-set.
    pub fn has_set_column(&self, name: &str) -> bool {
        self.cells(name)
            .map(|cells| cells.iter().all(Cell::is_set))
            .unwrap_or(false)
    }

    pub fn has_set_columns<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names.iter().all(|n| self.has_set_column(n.as_ref()))
    }

    pub fn get_column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn get_set_column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, cells)| cells.iter().all(Cell::is_set))
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Overwrites one existing cell. Never grows the table.
    pub fn set(&mut self, column: &str, index: usize, value: impl Into<Value>) -> Result<&mut Self> {
        let position = self
            .column_index(column)
            .ok_or_else(|| Error::DataTable(format!("Column \"{}\" does not exist", column)))?;
        let cells = &mut self.columns[position].1;
        let length = cells.len();
        let cell = cells.get_mut(index).ok_or_else(|| {
            Error::DataTable(format!(
                "Index {} does not exist in column \"{}\" of length {}",
                index, column, length
            ))
        })?;
        *cell = Cell::Set(value.into());
        Ok(self)
    }

    /// Column names with their raw cells, in insertion order.
    pub fn iter_columns(&self) -> impl Iterator<Item = (&str, &[Cell])> {
        self.columns.iter().map(|(k, c)| (k.as_str(), c.as_slice()))
    }
}

fn values_match(actual: &Value, expected: &Value) -> bool {
    if actual.loose_eq(expected) {
        return true;
    }
    if let Some(candidates) = expected.elements() {
        return candidates.iter().any(|c| c.loose_eq(actual));
    }
    if let Some(items) = actual.elements() {
        return items.iter().any(|i| i.loose_eq(expected));
    }
    false
}

/// Iterator over the rows of a normalized table.
pub struct Records<'a> {
    table: &'a DataTable,
    index: usize,
    end: usize,
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.index >= self.end {
            return None;
        }
        let record = self.table.row_unchecked(self.index);
        self.index += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Records<'_> {}

impl Serialize for DataTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (k, cells) in &self.columns {
            map.serialize_entry(k, cells)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use proptest::prelude::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|v| Value::from(*v)).collect()
    }

    #[test]
    fn test_empty_table() {
        let table = DataTable::new();
        assert_eq!(table.max_length(), 0);
        assert_eq!(table.min_length(), 0);
        assert!(table.is_normalized());
        assert!(table.is_empty());
        assert_eq!(table.get_records().unwrap().count(), 0);
    }

    #[test]
    fn test_create_and_normalize() {
        let mut table = DataTable::create([("a", vec![1, 2, 3]), ("b", vec![1])]);
        assert_eq!(table.get_lengths(), vec![3, 1]);
        assert!(!table.is_normalized());
        assert!(table.get_record(0).is_err());
        assert!(table.get_column("a").is_err());

        table.normalize();
        assert!(table.is_normalized());
        assert_eq!(table.get_column("b").unwrap(), vec![Value::from(1), Value::Null, Value::Null]);
        assert_eq!(table.get_column("missing").unwrap(), vec![Value::Null; 3]);
    }

    #[test]
    fn test_add_record_backfills() {
        let mut table = DataTable::new();
        table.add_record(record! { "a" => 1 }).unwrap();
        table.add_record(record! { "a" => 2 }).unwrap();
        table.add_record(record! { "b" => "x" }).unwrap();

        assert_eq!(table.get_lengths(), vec![3, 3]);
        assert_eq!(table.get_record(0).unwrap(), record! { "a" => 1, "b" => Value::Null });
        assert_eq!(table.get_record(2).unwrap(), record! { "a" => Value::Null, "b" => "x" });
        assert!(table.has_column("b"));
        assert!(!table.has_set_column("b"));
        assert!(!table.has_set_column("a"));
    }

    #[test]
    fn test_add_record_requires_normalized() {
        let mut table = DataTable::create([("a", vec![1, 2]), ("b", vec![1])]);
        let err = table.add_record(record! { "a" => 3 }).unwrap_err();
        assert!(matches!(err, Error::DataTable(_)));
    }

    #[test]
    fn test_custom_not_set_value() {
        let mut table = DataTable::new().with_not_set_value(Value::from("n/a"));
        table.add_records([record! { "a" => 1 }, record! { "b" => 2 }]).unwrap();
        assert_eq!(table.get_record(1).unwrap().get("a"), Some(&Value::from("n/a")));
    }

    #[test]
    fn test_get_set_record_skips_not_set() {
        let mut table = DataTable::new();
        table.add_records([record! { "a" => 1 }, record! { "b" => 2 }]).unwrap();
        assert_eq!(table.get_set_record(0).unwrap(), record! { "a" => 1 });
        assert_eq!(table.get_set_record(1).unwrap(), record! { "b" => 2 });
    }

    #[test]
    fn test_get_record_out_of_range() {
        let table = DataTable::create([("a", vec![1])]);
        assert!(table.get_record(0).is_ok());
        assert!(matches!(table.get_record(1), Err(Error::DataTable(_))));
    }

    #[test]
    fn test_round_trip_through_records() {
        let table = DataTable::create([("a", vec![1, 2]), ("b", vec![3, 4])]);
        let records: Vec<Record> = table.get_records().unwrap().collect();

        let mut copy = DataTable::new();
        copy.add_records(records).unwrap();
        assert_eq!(copy, table);
        assert_eq!(copy.get_column("a").unwrap(), ints(&[1, 2]));
        assert_eq!(copy.get_column("b").unwrap(), ints(&[3, 4]));
    }

    #[test]
    fn test_filter_keys() {
        let table = DataTable::create([("a", vec![1]), ("b", vec![2]), ("c", vec![3])]);
        let filtered = table.filter_keys(&["c", "a", "missing"]);
        assert_eq!(filtered.get_column_names(), vec!["a", "c"]);
    }

    #[test]
    fn test_filter_records_membership() {
        let table = DataTable::create([("a", vec![1, 2, 1]), ("c", vec![10, 20, 30])]);
        let result = table.filter_records(&record! { "a" => 1 }).unwrap();
        assert_eq!(result.get_column("a").unwrap(), ints(&[1, 1]));
        assert_eq!(result.get_column("c").unwrap(), ints(&[10, 30]));

        let none = table.filter_records(&record! { "d" => 1 }).unwrap();
        assert_eq!(none.get_column_names(), vec!["a", "c"]);
        assert!(none.is_empty());
    }

    #[test]
    fn test_filter_records_list_values() {
        let table = DataTable::create([
            ("tags", vec![Value::list(ints(&[1, 2])), Value::list(ints(&[3]))]),
            ("name", vec![Value::from("x"), Value::from("y")]),
        ]);
        let by_member = table.filter_records(&record! { "tags" => 3 }).unwrap();
        assert_eq!(by_member.get_column("name").unwrap(), vec![Value::from("y")]);

        let by_candidates = table
            .filter_records(&record! { "name" => Value::list([Value::from("x"), Value::from("z")]) })
            .unwrap();
        assert_eq!(by_candidates.len(), 1);
        assert_eq!(by_candidates.get_record(0).unwrap().get("name"), Some(&Value::from("x")));
    }

    #[test]
    fn test_add_table() {
        let mut table = DataTable::create([("a", vec![1])]);
        let other = DataTable::create([("a", vec![2]), ("b", vec![3])]);
        table.add_table(&[&other]).unwrap();
        assert_eq!(table.get_column("a").unwrap(), ints(&[1, 2]));
        assert_eq!(table.get_column("b").unwrap(), vec![Value::Null, Value::from(3)]);

        let broken = DataTable::create([("a", vec![1, 2]), ("b", vec![1])]);
        assert!(matches!(table.add_table(&[&broken]), Err(Error::DataTable(_))));
    }

    #[test]
    fn test_add_table_keeps_not_set_cells() {
        let mut source = DataTable::new();
        source.add_records([record! { "a" => 1 }, record! { "b" => 2 }]).unwrap();
        let mut target = DataTable::new();
        target.add_table(&[&source]).unwrap();
        assert!(!target.has_set_column("a"));
        assert_eq!(target.get_set_record(1).unwrap(), record! { "b" => 2 });
    }

    #[test]
    fn test_drop_duplicates_case_insensitive() {
        let table = DataTable::create([
            ("email", vec!["A@x.com", "a@x.com", "b@x.com"]),
            ("n", vec!["1", "2", "3"]),
        ]);
        let deduped = table.drop_duplicates(&["email"]).unwrap();
        assert_eq!(
            deduped.get_column("n").unwrap(),
            vec![Value::from("1"), Value::from("3")]
        );

        let strict = table.drop_duplicates_with(&["email"], false).unwrap();
        assert_eq!(strict.len(), 3);
    }

    #[test]
    fn test_drop_duplicates_whole_rows() {
        let table = DataTable::create([("a", vec![1, 1, 1]), ("b", vec![1, 1, 2])]);
        let deduped = table.drop_duplicates::<&str>(&[]).unwrap();
        assert_eq!(deduped.get_column("b").unwrap(), ints(&[1, 2]));
    }

    #[test]
    fn test_set_cell() {
        let mut table = DataTable::create([("a", vec![1, 2])]);
        table.set("a", 1, 5).unwrap();
        assert_eq!(table.get_column("a").unwrap(), ints(&[1, 5]));
        assert!(matches!(table.set("b", 0, 1), Err(Error::DataTable(_))));
        assert!(matches!(table.set("a", 2, 1), Err(Error::DataTable(_))));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_set_column_names() {
        let mut table = DataTable::new();
        table.add_records([record! { "a" => 1, "b" => 1 }, record! { "a" => 2 }]).unwrap();
        assert_eq!(table.get_column_names(), vec!["a", "b"]);
        assert_eq!(table.get_set_column_names(), vec!["a"]);
        assert!(table.has_columns(&["a", "b"]));
        assert!(!table.has_set_columns(&["a", "b"]));
    }

    #[test]
    fn test_serialize_rejects_not_set() {
        let mut table = DataTable::new();
        table.add_records([record! { "a" => 1 }, record! { "b" => 2 }]).unwrap();
        assert!(serde_json::to_string(&table).is_err());

        let full = DataTable::create([("a", vec![1])]);
        assert_eq!(serde_json::to_string(&full).unwrap(), r#"{"a":[{"N":"1"}]}"#);
    }

    #[derive(Debug, PartialEq)]
    struct User {
        name: String,
        age: i64,
    }

    impl FromRecord for User {
        fn from_record(record: &Record) -> Result<Self> {
            let name = record
                .get("name")
                .and_then(Value::as_string)
                .ok_or_else(|| Error::DataTable("name is required".into()))?;
            let age = record.get("age").and_then(Value::as_i64).unwrap_or(0);
            Ok(User {
                name: name.to_string(),
                age,
            })
        }
    }

    #[test]
    fn test_typed_records() {
        let mut table = DataTable::new();
        table
            .add_records([record! { "name" => "ann", "age" => 31 }, record! { "name" => "bob" }])
            .unwrap();
        let users: Vec<User> = table.get_typed_records().unwrap();
        assert_eq!(users[0], User { name: "ann".into(), age: 31 });
        assert_eq!(users[1].age, 0);
        assert_eq!(table.get_typed_record::<User>(1).unwrap().name, "bob");
    }

    fn arb_table() -> impl Strategy<Value = DataTable> {
        prop::collection::vec(("[a-d]", prop::collection::vec(0i64..5, 0..6)), 0..5).prop_map(
            |columns| {
                let mut table = DataTable::new();
                for (key, values) in columns {
                    table.append(&key, values);
                }
                table
            },
        )
    }

    proptest! {
        #[test]
        fn test_normalize_is_idempotent(table in arb_table()) {
            let mut once = table.clone();
            once.normalize();
            let mut twice = once.clone();
            twice.normalize();
            prop_assert_eq!(once.get_lengths(), twice.get_lengths());
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.is_normalized());
        }

        #[test]
        fn test_add_record_backfill_invariant(
            rows in prop::collection::vec(prop::collection::btree_map("[a-e]", 0i64..9, 0..4), 1..8)
        ) {
            prop_assume!(!rows[0].is_empty());
            let mut table = DataTable::new();
            for row in &rows {
                table.add_record(row.iter().map(|(k, v)| (k.clone(), *v)).collect::<Record>()).unwrap();
            }
            for length in table.get_lengths() {
                prop_assert_eq!(length, rows.len());
            }
            for (index, row) in rows.iter().enumerate() {
                let record = table.get_record(index).unwrap();
                for key in table.get_column_names() {
                    let expected = row.get(key).map(|v| Value::from(*v)).unwrap_or(Value::Null);
                    prop_assert_eq!(record.get(key), Some(&expected));
                }
            }
        }

        #[test]
        fn test_filter_preserves_row_order(values in prop::collection::vec(0i64..3, 0..20)) {
            let ids: Vec<i64> = (0..values.len() as i64).collect();
            let table = DataTable::create([("v", ints(&values)), ("id", ints(&ids))]);
            let filtered = table.filter_records(&record! { "v" => 1 }).unwrap();
            let kept: Vec<Value> = ids
                .iter()
                .zip(&values)
                .filter(|(_, v)| **v == 1)
                .map(|(id, _)| Value::from(*id))
                .collect();
            prop_assert_eq!(filtered.get_column("id").unwrap(), kept);
        }
    }
}
