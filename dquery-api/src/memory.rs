/// In-memory table for testing and local use
///
/// Implements the transport traits over a locked map of items. Rendered
/// expressions are parsed and evaluated like the provider would: key
/// conditions select and order items, `Limit` caps evaluated items before
/// the filter runs, and `LastEvaluatedKey` is returned while items remain.
/// All data is lost when the table is dropped.

use crate::index::TableIndex;
use crate::transport::{
    AttributeNames, BatchGetItemInput, BatchGetItemOutput, BatchWriteItemInput,
    BatchWriteItemOutput, CreateTableInput, DeleteItemInput, GetItemInput, GetItemOutput,
    KeySchemaElement, KeyType, PageOutput, QueryInput, ReturnValues, ScanInput, TableLifecycle,
    TableResource, TableStatus, UpdateItemInput, WriteItemOutput, WriteRequest,
};
use dquery_core::evaluator::{project, ExpressionContext, ExpressionEvaluator, UpdateExecutor};
use dquery_core::parser::{ExpressionParser, ProjectionParser, UpdateExpressionParser};
use dquery_core::{json, Error, Record, Result, TableKeys, Value};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Provider ceiling on keys per batch get.
const MAX_BATCH_GET_KEYS: usize = 100;

/// Provider ceiling on requests per batch write.
const MAX_BATCH_WRITE_REQUESTS: usize = 25;

fn validation_error(message: impl Into<String>) -> Error {
    Error::transport("ValidationException", message)
}

fn not_found_error(table: &str) -> Error {
    Error::transport(
        "ResourceNotFoundException",
        format!("Requested resource not found: Table: {} not found", table),
    )
}

/// Inner mutable state
struct MemoryTableInner {
    keys: TableKeys,
    indexes: Vec<TableIndex>,
    items: HashMap<String, Record>,
    status: TableStatus,
}

/// In-process table implementing [`TableResource`] and [`TableLifecycle`].
pub struct MemoryTable {
    name: String,
    inner: RwLock<MemoryTableInner>,
}

impl MemoryTable {
    /// Create an empty, active table
    pub fn new(name: impl Into<String>, keys: TableKeys) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(MemoryTableInner {
                keys,
                indexes: Vec::new(),
                items: HashMap::new(),
                status: TableStatus::Active,
            }),
        }
    }

    /// Add a secondary index usable through `IndexName`
    pub fn with_index(self, index: TableIndex) -> Self {
        self.inner.write().indexes.push(index);
        self
    }

    /// Store an item, replacing any item with the same key
    pub fn put(&self, item: Record) -> Result<()> {
        let mut inner = self.inner.write();
        let fingerprint = key_fingerprint(&inner.keys, &item)?;
        inner.items.insert(fingerprint, item);
        Ok(())
    }

    pub fn get(&self, key: &Record) -> Option<Record> {
        let inner = self.inner.read();
        let fingerprint = key_fingerprint(&inner.keys, key).ok()?;
        inner.items.get(&fingerprint).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All items in key order
    pub fn items(&self) -> Vec<Record> {
        let inner = self.inner.read();
        let mut items: Vec<Record> = inner.items.values().cloned().collect();
        let order = [inner.keys.clone()];
        items.sort_by(|a, b| compare_items(a, b, &order));
        items
    }

    fn ensure_active(inner: &MemoryTableInner, name: &str) -> Result<()> {
        match inner.status {
            TableStatus::NotFound | TableStatus::Deleting => Err(not_found_error(name)),
            _ => Ok(()),
        }
    }
}

/// Identity of an item: its table-key attributes as sorted JSON.
fn key_fingerprint(keys: &TableKeys, record: &Record) -> Result<String> {
    let names = keys.names();
    if let Some(missing) = names.iter().find(|k| !record.contains_key(k)) {
        return Err(validation_error(format!(
            "The provided key element does not match the schema: missing \"{}\"",
            missing
        )));
    }
    json::dumps(&record.filter_keys(&names))
}

/// Fingerprints every key of one batch request; a repeated key is rejected.
fn batch_fingerprints<'a>(
    keys: &TableKeys,
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut fingerprints = Vec::new();
    for record in records {
        let fingerprint = key_fingerprint(keys, record)?;
        if !seen.insert(fingerprint.clone()) {
            return Err(validation_error(format!(
                "Provided list of item keys contains duplicates: {}",
                fingerprint
            )));
        }
        fingerprints.push(fingerprint);
    }
    Ok(fingerprints)
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.compare(b).unwrap_or_else(|| {
            let a = json::dumps_value(a).unwrap_or_default();
            let b = json::dumps_value(b).unwrap_or_default();
            a.cmp(&b)
        }),
    }
}

/// Orders by each key set in turn: partition key, then sort key.
fn compare_items(a: &Record, b: &Record, order: &[TableKeys]) -> Ordering {
    for keys in order {
        for name in keys.names() {
            match compare_values(a.get(name), b.get(name)) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
    }
    Ordering::Equal
}

fn projection_paths(
    expression: Option<&str>,
    context: &ExpressionContext,
) -> Result<Option<Vec<Vec<String>>>> {
    let Some(expression) = expression else {
        return Ok(None);
    };
    let paths = ProjectionParser::parse(expression)?
        .iter()
        .map(|p| context.resolve_path(p))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(paths))
}

/// Walks ordered candidates after the start key, evaluating at most
/// `limit` of them.
fn paginate(
    candidates: Vec<Record>,
    order: &[TableKeys],
    forward: bool,
    exclusive_start_key: Option<&Record>,
    limit: Option<usize>,
    filter: impl Fn(&Record) -> Result<bool>,
) -> Result<(Vec<Record>, usize, Option<Record>)> {
    let mut remaining: Vec<Record> = candidates
        .into_iter()
        .filter(|item| match exclusive_start_key {
            None => true,
            Some(start) => {
                let ordering = compare_items(item, start, order);
                if forward {
                    ordering == Ordering::Greater
                } else {
                    ordering == Ordering::Less
                }
            }
        })
        .collect();

    let limit = limit.unwrap_or(usize::MAX);
    if limit == 0 {
        return Err(validation_error("Limit must be greater than or equal to 1"));
    }
    let evaluated_count = remaining.len().min(limit);
    let rest = remaining.split_off(evaluated_count);

    let mut items = Vec::new();
    for item in &remaining {
        if filter(item)? {
            items.push(item.clone());
        }
    }

    let last_evaluated_key = match (rest.is_empty(), remaining.last()) {
        (false, Some(last)) => {
            let names: Vec<&str> = order.iter().flat_map(|k| k.names()).collect();
            Some(last.filter_keys(&names))
        }
        _ => None,
    };
    Ok((items, evaluated_count, last_evaluated_key))
}

fn apply_projection(items: Vec<Record>, paths: &Option<Vec<Vec<String>>>) -> Vec<Record> {
    match paths {
        Some(paths) => items.iter().map(|item| project(item, paths)).collect(),
        None => items,
    }
}

fn check_condition(
    condition: Option<&str>,
    item: &Record,
    context: &ExpressionContext,
) -> Result<()> {
    let Some(condition) = condition else {
        return Ok(());
    };
    let expr = ExpressionParser::parse(condition)?;
    if ExpressionEvaluator::new(item, context).evaluate(&expr)? {
        Ok(())
    } else {
        Err(Error::ConditionalCheckFailed(
            "The conditional request failed".into(),
        ))
    }
}

fn key_schema_of(keys: &TableKeys) -> Vec<KeySchemaElement> {
    let mut schema = vec![KeySchemaElement::hash(&keys.partition_key)];
    if let Some(sort_key) = &keys.sort_key {
        schema.push(KeySchemaElement::range(sort_key));
    }
    schema
}

fn keys_from_schema(schema: &[KeySchemaElement]) -> Result<TableKeys> {
    let find = |key_type: KeyType| {
        schema
            .iter()
            .find(|e| e.key_type == key_type)
            .map(|e| e.attribute_name.clone())
    };
    let partition_key =
        find(KeyType::Hash).ok_or_else(|| validation_error("Key schema needs a HASH key"))?;
    Ok(TableKeys {
        partition_key,
        sort_key: find(KeyType::Range),
    })
}

fn context_of(names: &AttributeNames, values: &HashMap<String, Value>) -> ExpressionContext {
    ExpressionContext::from_maps(names.clone(), values.clone())
}

impl TableResource for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn key_schema(&self) -> Result<Vec<KeySchemaElement>> {
        let inner = self.inner.read();
        Self::ensure_active(&inner, &self.name)?;
        Ok(key_schema_of(&inner.keys))
    }

    fn scan(&self, input: &ScanInput) -> Result<PageOutput> {
        let inner = self.inner.read();
        Self::ensure_active(&inner, &self.name)?;
        let context = context_of(&input.expression_attribute_names, &input.expression_attribute_values);
        let filter = input
            .filter_expression
            .as_deref()
            .map(ExpressionParser::parse)
            .transpose()?;
        let projection = projection_paths(input.projection_expression.as_deref(), &context)?;

        let order = [inner.keys.clone()];
        let mut candidates: Vec<Record> = inner.items.values().cloned().collect();
        candidates.sort_by(|a, b| compare_items(a, b, &order));

        let (items, scanned_count, last_evaluated_key) = paginate(
            candidates,
            &order,
            true,
            input.exclusive_start_key.as_ref(),
            input.limit,
            |item| match &filter {
                Some(expr) => ExpressionEvaluator::new(item, &context).evaluate(expr),
                None => Ok(true),
            },
        )?;
        debug!(table = %self.name, items = items.len(), scanned_count, "Scan");

        let items = apply_projection(items, &projection);
        Ok(PageOutput {
            count: items.len(),
            items,
            scanned_count,
            last_evaluated_key,
            consumed_capacity: None,
        })
    }

    fn query(&self, input: &QueryInput) -> Result<PageOutput> {
        let inner = self.inner.read();
        Self::ensure_active(&inner, &self.name)?;
        let context = context_of(&input.expression_attribute_names, &input.expression_attribute_values);
        let key_condition = ExpressionParser::parse(&input.key_condition_expression)?;
        let filter = input
            .filter_expression
            .as_deref()
            .map(ExpressionParser::parse)
            .transpose()?;
        let projection = projection_paths(input.projection_expression.as_deref(), &context)?;

        let order = match &input.index_name {
            None => vec![inner.keys.clone()],
            Some(name) => {
                let index = inner
                    .indexes
                    .iter()
                    .find(|i| i.raw_name() == name)
                    .ok_or_else(|| {
                        validation_error(format!(
                            "The table does not have the specified index: {}",
                            name
                        ))
                    })?;
                vec![index.table_keys(), inner.keys.clone()]
            }
        };
        let index_keys = &order[0];

        let mut candidates = Vec::new();
        for item in inner.items.values() {
            if !index_keys.names().iter().all(|k| item.contains_key(k)) {
                continue;
            }
            if ExpressionEvaluator::new(item, &context).evaluate(&key_condition)? {
                candidates.push(item.clone());
            }
        }
        candidates.sort_by(|a, b| compare_items(a, b, &order));
        if !input.scan_index_forward {
            candidates.reverse();
        }

        let (items, scanned_count, last_evaluated_key) = paginate(
            candidates,
            &order,
            input.scan_index_forward,
            input.exclusive_start_key.as_ref(),
            input.limit,
            |item| match &filter {
                Some(expr) => ExpressionEvaluator::new(item, &context).evaluate(expr),
                None => Ok(true),
            },
        )?;
        debug!(table = %self.name, items = items.len(), scanned_count, "Query");

        let items = apply_projection(items, &projection);
        Ok(PageOutput {
            count: items.len(),
            items,
            scanned_count,
            last_evaluated_key,
            consumed_capacity: None,
        })
    }

    fn get_item(&self, input: &GetItemInput) -> Result<GetItemOutput> {
        let inner = self.inner.read();
        Self::ensure_active(&inner, &self.name)?;
        let context = ExpressionContext::from_maps(
            input.expression_attribute_names.clone(),
            HashMap::new(),
        );
        let projection = projection_paths(input.projection_expression.as_deref(), &context)?;
        let fingerprint = key_fingerprint(&inner.keys, &input.key)?;
        let item = inner.items.get(&fingerprint).cloned();
        let item = match (item, &projection) {
            (Some(item), Some(paths)) => Some(project(&item, paths)),
            (item, _) => item,
        };
        Ok(GetItemOutput {
            item,
            consumed_capacity: None,
        })
    }

    fn update_item(&self, input: &UpdateItemInput) -> Result<WriteItemOutput> {
        let mut inner = self.inner.write();
        Self::ensure_active(&inner, &self.name)?;
        let context = context_of(&input.expression_attribute_names, &input.expression_attribute_values);
        let fingerprint = key_fingerprint(&inner.keys, &input.key)?;
        let old = inner.items.get(&fingerprint).cloned();
        let current = old.clone().unwrap_or_default();

        check_condition(input.condition_expression.as_deref(), &current, &context)?;

        let actions = UpdateExpressionParser::parse(&input.update_expression)?;
        let mut base = current.clone();
        base.update(&input.key);
        let mut updated = UpdateExecutor::new(&context).execute(&base, &actions)?;
        updated.update(&input.key);
        inner.items.insert(fingerprint, updated.clone());

        let attributes = match input.return_values {
            ReturnValues::None => None,
            ReturnValues::AllNew => Some(updated),
            ReturnValues::AllOld => old,
            ReturnValues::UpdatedNew => Some(
                updated
                    .iter()
                    .filter(|(k, v)| current.get(k) != Some(*v))
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            ),
            ReturnValues::UpdatedOld => Some(
                current
                    .iter()
                    .filter(|(k, v)| updated.get(k) != Some(*v))
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            ),
        };
        Ok(WriteItemOutput {
            attributes,
            consumed_capacity: None,
            item_collection_metrics: None,
        })
    }

    fn delete_item(&self, input: &DeleteItemInput) -> Result<WriteItemOutput> {
        let mut inner = self.inner.write();
        Self::ensure_active(&inner, &self.name)?;
        let context = context_of(&input.expression_attribute_names, &input.expression_attribute_values);
        let fingerprint = key_fingerprint(&inner.keys, &input.key)?;
        let current = inner.items.get(&fingerprint).cloned().unwrap_or_default();

        check_condition(input.condition_expression.as_deref(), &current, &context)?;

        let old = inner.items.remove(&fingerprint);
        let attributes = match input.return_values {
            ReturnValues::AllOld => old,
            _ => None,
        };
        Ok(WriteItemOutput {
            attributes,
            consumed_capacity: None,
            item_collection_metrics: None,
        })
    }

    fn batch_get_item(&self, input: &BatchGetItemInput) -> Result<BatchGetItemOutput> {
        if input.keys.len() > MAX_BATCH_GET_KEYS {
            return Err(validation_error(format!(
                "Too many items requested for the BatchGetItem call: {}",
                input.keys.len()
            )));
        }
        let inner = self.inner.read();
        Self::ensure_active(&inner, &self.name)?;
        let context = ExpressionContext::from_maps(
            input.expression_attribute_names.clone(),
            HashMap::new(),
        );
        let projection = projection_paths(input.projection_expression.as_deref(), &context)?;

        let mut responses = Vec::new();
        for fingerprint in batch_fingerprints(&inner.keys, &input.keys)? {
            if let Some(item) = inner.items.get(&fingerprint) {
                responses.push(item.clone());
            }
        }
        Ok(BatchGetItemOutput {
            responses: apply_projection(responses, &projection),
            unprocessed_keys: Vec::new(),
            consumed_capacity: None,
        })
    }

    fn batch_write_item(&self, input: &BatchWriteItemInput) -> Result<BatchWriteItemOutput> {
        if input.requests.len() > MAX_BATCH_WRITE_REQUESTS {
            return Err(validation_error(format!(
                "Too many items requested for the BatchWriteItem call: {}",
                input.requests.len()
            )));
        }
        let mut inner = self.inner.write();
        Self::ensure_active(&inner, &self.name)?;
        let fingerprints = batch_fingerprints(
            &inner.keys,
            input.requests.iter().map(|request| match request {
                WriteRequest::Put { item } => item,
                WriteRequest::Delete { key } => key,
            }),
        )?;
        for (request, fingerprint) in input.requests.iter().zip(fingerprints) {
            match request {
                WriteRequest::Put { item } => {
                    inner.items.insert(fingerprint, item.clone());
                }
                WriteRequest::Delete { .. } => {
                    inner.items.remove(&fingerprint);
                }
            }
        }
        Ok(BatchWriteItemOutput::default())
    }
}

impl TableLifecycle for MemoryTable {
    fn create_table(&self, input: &CreateTableInput) -> Result<()> {
        let mut inner = self.inner.write();
        if !matches!(inner.status, TableStatus::NotFound) {
            return Err(Error::transport(
                "ResourceInUseException",
                format!("Table already exists: {}", self.name),
            ));
        }
        inner.keys = keys_from_schema(&input.key_schema)?;
        inner.indexes = input
            .global_secondary_indexes
            .iter()
            .chain(&input.local_secondary_indexes)
            .map(|definition| {
                let keys = keys_from_schema(&definition.key_schema)?;
                Ok(TableIndex::new(
                    definition.index_name.clone(),
                    keys.partition_key,
                    keys.sort_key.as_deref(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        inner.items.clear();
        inner.status = TableStatus::Active;
        debug!(table = %self.name, "Created table");
        Ok(())
    }

    fn delete_table(&self) -> Result<()> {
        let mut inner = self.inner.write();
        Self::ensure_active(&inner, &self.name)?;
        inner.items.clear();
        inner.status = TableStatus::NotFound;
        debug!(table = %self.name, "Deleted table");
        Ok(())
    }

    fn table_status(&self) -> Result<TableStatus> {
        Ok(self.inner.read().status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dquery_core::record;

    fn table() -> MemoryTable {
        let table = MemoryTable::new("events", TableKeys::with_sort_key("pk", "sk"))
            .with_index(TableIndex::new("by_kind", "kind", Some("sk")));
        for (pk, sk, kind) in [("a", "1", "x"), ("a", "2", "y"), ("a", "3", "x"), ("b", "1", "x")] {
            table
                .put(record! { "pk" => pk, "sk" => sk, "kind" => kind })
                .unwrap();
        }
        table
    }

    fn names(pairs: &[(&str, &str)]) -> AttributeNames {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn query_input(pk: &str) -> QueryInput {
        QueryInput {
            key_condition_expression: "#aaa = :aaa".into(),
            filter_expression: None,
            projection_expression: None,
            index_name: None,
            expression_attribute_names: names(&[("#aaa", "pk")]),
            expression_attribute_values: [(":aaa".to_string(), Value::from(pk))]
                .into_iter()
                .collect(),
            limit: None,
            exclusive_start_key: None,
            consistent_read: false,
            scan_index_forward: true,
            return_consumed_capacity: Default::default(),
        }
    }

    fn sort_keys(output: &PageOutput) -> Vec<Value> {
        output
            .items
            .iter()
            .filter_map(|i| i.get("sk").cloned())
            .collect()
    }

    #[test]
    fn test_put_get_and_order() {
        let table = table();
        assert_eq!(table.len(), 4);
        let item = table.get(&record! { "pk" => "a", "sk" => "2" }).unwrap();
        assert_eq!(item.get("kind"), Some(&Value::from("y")));
        assert!(table.get(&record! { "pk" => "a" }).is_none());
        assert!(table.put(record! { "pk" => "c" }).is_err());

        let order: Vec<Value> = table.items().iter().filter_map(|i| i.get("pk").cloned()).collect();
        assert_eq!(order, vec![Value::from("a"), Value::from("a"), Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_query_direction_and_pagination() {
        let table = table();
        let output = table.query(&query_input("a")).unwrap();
        assert_eq!(sort_keys(&output), vec![Value::from("1"), Value::from("2"), Value::from("3")]);
        assert!(output.last_evaluated_key.is_none());

        let mut input = query_input("a");
        input.scan_index_forward = false;
        input.limit = Some(2);
        let output = table.query(&input).unwrap();
        assert_eq!(sort_keys(&output), vec![Value::from("3"), Value::from("2")]);
        let cursor = output.last_evaluated_key.clone().unwrap();
        assert_eq!(cursor, record! { "pk" => "a", "sk" => "2" });

        input.exclusive_start_key = Some(cursor);
        let output = table.query(&input).unwrap();
        assert_eq!(sort_keys(&output), vec![Value::from("1")]);
        assert!(output.last_evaluated_key.is_none());
    }

    #[test]
    fn test_limit_counts_evaluated_items() {
        let table = table();
        let mut input = query_input("a");
        input.filter_expression = Some("#aab = :aab".into());
        input.expression_attribute_names = names(&[("#aaa", "pk"), ("#aab", "kind")]);
        input
            .expression_attribute_values
            .insert(":aab".into(), Value::from("y"));
        input.limit = Some(1);
        let output = table.query(&input).unwrap();
        assert_eq!(output.count, 0);
        assert_eq!(output.scanned_count, 1);
        assert!(output.last_evaluated_key.is_some());
    }

    #[test]
    fn test_query_secondary_index() {
        let table = table();
        let mut input = query_input("x");
        input.index_name = Some("by_kind".into());
        input.expression_attribute_names = names(&[("#aaa", "kind")]);
        input.limit = Some(2);
        let output = table.query(&input).unwrap();
        assert_eq!(output.count, 2);
        let cursor = output.last_evaluated_key.unwrap();
        assert!(cursor.contains_key("kind") && cursor.contains_key("pk"));

        input.index_name = Some("missing".into());
        let err = table.query(&input).unwrap_err();
        assert!(err.to_string().contains("ValidationException"));
    }

    #[test]
    fn test_scan_with_projection() {
        let table = table();
        let output = table
            .scan(&ScanInput {
                projection_expression: Some("#aaa".into()),
                expression_attribute_names: names(&[("#aaa", "kind")]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(output.count, 4);
        assert_eq!(output.items[0], record! { "kind" => "x" });
    }

    #[test]
    fn test_update_item_conditions_and_return_values() {
        let table = table();
        let input = UpdateItemInput {
            key: record! { "pk" => "a", "sk" => "1" },
            update_expression: "SET #aaa = :aaa".into(),
            condition_expression: Some("attribute_exists(#aab)".into()),
            expression_attribute_names: names(&[("#aaa", "kind"), ("#aab", "pk")]),
            expression_attribute_values: [(":aaa".to_string(), Value::from("z"))]
                .into_iter()
                .collect(),
            return_values: ReturnValues::UpdatedNew,
            ..Default::default()
        };
        let output = table.update_item(&input).unwrap();
        assert_eq!(output.attributes, Some(record! { "kind" => "z" }));

        let mut missing = input.clone();
        missing.key = record! { "pk" => "new", "sk" => "1" };
        let err = table.update_item(&missing).unwrap_err();
        assert!(matches!(err, Error::ConditionalCheckFailed(_)));

        missing.condition_expression = None;
        missing.return_values = ReturnValues::AllNew;
        let output = table.update_item(&missing).unwrap();
        assert_eq!(
            output.attributes,
            Some(record! { "pk" => "new", "sk" => "1", "kind" => "z" })
        );
    }

    #[test]
    fn test_delete_and_batch_operations() {
        let table = table();
        let output = table
            .delete_item(&DeleteItemInput {
                key: record! { "pk" => "a", "sk" => "1" },
                return_values: ReturnValues::AllOld,
                ..Default::default()
            })
            .unwrap();
        assert!(output.attributes.is_some());
        assert_eq!(table.len(), 3);

        let output = table
            .batch_get_item(&BatchGetItemInput {
                table_name: "events".into(),
                keys: vec![record! { "pk" => "a", "sk" => "2" }, record! { "pk" => "a", "sk" => "9" }],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(output.responses.len(), 1);

        let requests = (0..26)
            .map(|i| WriteRequest::put(record! { "pk" => "c", "sk" => i }))
            .collect();
        let err = table
            .batch_write_item(&BatchWriteItemInput {
                table_name: "events".into(),
                requests,
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("Too many items"));
    }

    #[test]
    fn test_batch_rejects_duplicate_keys() {
        let table = table();
        let key = record! { "pk" => "a", "sk" => "1" };
        let err = table
            .batch_get_item(&BatchGetItemInput {
                table_name: "events".into(),
                keys: vec![key.clone(), key.clone()],
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("ValidationException"));

        let err = table
            .batch_write_item(&BatchWriteItemInput {
                table_name: "events".into(),
                requests: vec![
                    WriteRequest::put(record! { "pk" => "a", "sk" => "1", "kind" => "q" }),
                    WriteRequest::delete(key),
                ],
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("duplicates"));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_lifecycle() {
        let table = table();
        assert_eq!(table.table_status().unwrap(), TableStatus::Active);
        assert!(table.create_table(&CreateTableInput::default()).is_err());

        table.delete_table().unwrap();
        assert_eq!(table.table_status().unwrap(), TableStatus::NotFound);
        assert!(table.scan(&ScanInput::default()).is_err());

        let input = CreateTableInput {
            key_schema: vec![KeySchemaElement::hash("id")],
            ..Default::default()
        };
        table.create_table(&input).unwrap();
        assert_eq!(table.key_schema().unwrap(), vec![KeySchemaElement::hash("id")]);
        assert!(table.is_empty());
    }
}
