//! Records: insertion-ordered attribute maps.
//!
//! `Record` is the generic row shape every query consumes and produces.
//! Typed rows plug in through [`FromRecord`] / [`IntoRecord`], and
//! [`RecordSchema`] carries per-field sanitizers and computed fields.

use crate::{Result, Value};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Attribute map that remembers insertion order.
#[derive(Debug, Clone, Default)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.position(key).map(move |i| &mut self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Inserts a value. An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overwrites this record's fields with `other`'s, appending new ones.
    pub fn update(&mut self, other: &Record) {
        for (key, value) in other.iter() {
            self.insert(key, value.clone());
        }
    }

    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&str, &Value) -> bool,
    {
        self.entries.retain(|(k, v)| f(k, v));
    }

    /// New record with only the named keys, in this record's order.
    pub fn filter_keys<S: AsRef<str>>(&self, keys: &[S]) -> Record {
        self.entries
            .iter()
            .filter(|(k, _)| keys.iter().any(|key| key.as_ref() == k))
            .cloned()
            .collect()
    }

    pub fn into_hash_map(self) -> HashMap<String, Value> {
        self.entries.into_iter().collect()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Record {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Keys are sorted so the resulting order is deterministic.
impl From<HashMap<String, Value>> for Record {
    fn from(map: HashMap<String, Value>) -> Self {
        let mut entries: Vec<(String, Value)> = map.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self { entries }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::M(record.into_hash_map())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Builds a [`Record`] from `key => value` pairs.
///
/// ```
/// use dquery_core::{record, Value};
///
/// let r = record! { "pk" => "user#1", "age" => 30 };
/// assert_eq!(r.get("age"), Some(&Value::from(30)));
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $( record.insert($key, $crate::Value::from($value)); )+
        record
    }};
}

/// Conversion of a typed row into a generic record.
pub trait IntoRecord {
    fn into_record(self) -> Record;
}

/// Extraction of a typed row from a generic record.
pub trait FromRecord: Sized {
    fn from_record(record: &Record) -> Result<Self>;
}

impl IntoRecord for Record {
    fn into_record(self) -> Record {
        self
    }
}

impl IntoRecord for HashMap<String, Value> {
    fn into_record(self) -> Record {
        Record::from(self)
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> IntoRecord for [(K, V); N] {
    fn into_record(self) -> Record {
        self.into_iter().collect()
    }
}

impl FromRecord for Record {
    fn from_record(record: &Record) -> Result<Self> {
        Ok(record.clone())
    }
}

type Sanitizer = Arc<dyn Fn(Value) -> Value + Send + Sync>;
type ComputedField = Arc<dyn Fn(&Record) -> Option<Value> + Send + Sync>;

/// Registration table of field hooks for a record type.
///
/// Sanitizers normalize a present field; computed fields derive a value
/// from the whole record. Sanitizers run first, computed fields after,
/// each in registration order.
#[derive(Clone, Default)]
pub struct RecordSchema {
    sanitizers: Vec<(String, Sanitizer)>,
    computed: Vec<(String, ComputedField)>,
}

impl RecordSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sanitizer<F>(mut self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.sanitizers.push((field.into(), Arc::new(f)));
        self
    }

    /// Registers a derived field. Returning `None` leaves the field untouched.
    pub fn with_computed<F>(mut self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Record) -> Option<Value> + Send + Sync + 'static,
    {
        self.computed.push((field.into(), Arc::new(f)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sanitizers.is_empty() && self.computed.is_empty()
    }

    pub fn apply(&self, record: &mut Record) {
        for (field, sanitize) in &self.sanitizers {
            if let Some(value) = record.remove_in_place(field) {
                record.insert(field.clone(), sanitize(value));
            }
        }
        for (field, compute) in &self.computed {
            if let Some(value) = compute(&*record) {
                record.insert(field.clone(), value);
            }
        }
    }

    pub fn applied(&self, mut record: Record) -> Record {
        self.apply(&mut record);
        record
    }
}

impl Record {
    /// Takes a value out but keeps its slot so a re-insert lands in place.
    fn remove_in_place(&mut self, key: &str) -> Option<Value> {
        self.get_mut(key).map(|v| std::mem::replace(v, Value::Null))
    }
}

impl fmt::Debug for RecordSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSchema")
            .field(
                "sanitizers",
                &self.sanitizers.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .field(
                "computed",
                &self.computed.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_position() {
        let mut r = record! { "a" => 1, "b" => 2 };
        r.insert("a", 10);
        r.insert("c", 3);
        assert_eq!(r.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(r.get("a"), Some(&Value::from(10)));
    }

    #[test]
    fn test_equality_ignores_order() {
        let left = record! { "a" => 1, "b" => 2 };
        let right = record! { "b" => 2, "a" => 1 };
        assert_eq!(left, right);
        assert_ne!(left, record! { "a" => 1 });
    }

    #[test]
    fn test_update_and_filter_keys() {
        let mut r = record! { "pk" => "x", "name" => "old" };
        r.update(&record! { "name" => "new", "age" => 3 });
        assert_eq!(r.get("name"), Some(&Value::from("new")));
        assert_eq!(r.filter_keys(&["pk", "age", "missing"]), record! { "pk" => "x", "age" => 3 });
    }

    #[test]
    fn test_serialize_in_insertion_order() {
        let r = record! { "z" => 1, "a" => "x" };
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"z":{"N":"1"},"a":{"S":"x"}}"#);
    }

    #[test]
    fn test_schema_sanitizers_then_computed() {
        let schema = RecordSchema::new()
            .with_sanitizer("email", |v| match v {
                Value::S(s) => Value::S(s.trim().to_lowercase()),
                other => other,
            })
            .with_computed("domain", |r| {
                r.get("email")
                    .and_then(Value::as_string)
                    .and_then(|e| e.split('@').nth(1))
                    .map(Value::from)
            });

        let r = schema.applied(record! { "email" => " Bob@Example.COM ", "id" => 1 });
        assert_eq!(r.get("email"), Some(&Value::from("bob@example.com")));
        assert_eq!(r.get("domain"), Some(&Value::from("example.com")));
        assert_eq!(r.keys().collect::<Vec<_>>(), vec!["email", "id", "domain"]);
    }

    #[test]
    fn test_schema_skips_missing_fields() {
        let schema = RecordSchema::new()
            .with_sanitizer("name", |_| Value::from("x"))
            .with_computed("never", |_| None);
        let r = schema.applied(record! { "id" => 1 });
        assert_eq!(r, record! { "id" => 1 });
    }
}
