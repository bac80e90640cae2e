/// Table manager façade
///
/// `DynamoTable` wraps one logical key-value table. Partition and sort keys
/// are read from the record or computed by caller-supplied functions, index
/// keys are validated before writes, timestamps are maintained, and batch
/// writes are de-duplicated by computed key before reaching the query layer.
/// Scans and queries are exposed as lazy record iterators.

use crate::index::TableIndex;
use crate::query::DynamoQuery;
use crate::transport::{
    AttributeDefinition, CreateTableInput, RawResponse, TableLifecycle, TableResource,
    TableStatus,
};
use dquery_core::expression::{AnyExpression, ConditionExpression, UpdateExpression};
use dquery_core::retry::retry_with_policy;
use dquery_core::{DataTable, Error, QueryConfig, Record, RecordSchema, Result, TableKeys, Value};
use serde_json::json;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Column holding the first write time of a record.
pub const CREATED_FIELD: &str = "dt_created";

/// Column holding the last write time of a record.
pub const MODIFIED_FIELD: &str = "dt_modified";

const TABLE_NOT_READY: &str = "TableNotReady";

/// Computes a key value from a record; `None` when it cannot.
pub type KeyFn = Arc<dyn Fn(&Record) -> Option<Value> + Send + Sync>;

/// Rows without their not-set cells.
fn set_records(data_table: &DataTable) -> Result<Vec<Record>> {
    (0..data_table.len())
        .map(|i| data_table.get_set_record(i))
        .collect()
}

fn timestamp() -> Value {
    Value::S(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
}

pub struct DynamoTable {
    resource: Arc<dyn TableResource>,
    lifecycle: Option<Arc<dyn TableLifecycle>>,
    primary_index: TableIndex,
    global_secondary_indexes: Vec<TableIndex>,
    local_secondary_indexes: Vec<TableIndex>,
    partition_key_fn: Option<KeyFn>,
    sort_key_fn: Option<KeyFn>,
    sort_key_prefix: Option<String>,
    schema: RecordSchema,
    config: QueryConfig,
}

impl DynamoTable {
    /// Table with `pk` / `sk` keys over the given resource.
    pub fn new(resource: Arc<dyn TableResource>) -> Self {
        Self {
            resource,
            lifecycle: None,
            primary_index: TableIndex::primary("pk", Some("sk")),
            global_secondary_indexes: Vec::new(),
            local_secondary_indexes: Vec::new(),
            partition_key_fn: None,
            sort_key_fn: None,
            sort_key_prefix: None,
            schema: RecordSchema::new(),
            config: QueryConfig::default(),
        }
    }

    /// Handle used for create, delete and status polling.
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn TableLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Replaces the primary index, e.g. for a partition-key-only table.
    pub fn with_primary_index(mut self, index: TableIndex) -> Self {
        self.primary_index = TableIndex::primary(
            index.partition_key_name.clone(),
            index.sort_key_name.as_deref(),
        )
        .with_partition_key_type(index.partition_key_type)
        .with_sort_key_type(index.sort_key_type);
        self
    }

    pub fn with_global_secondary_index(mut self, index: TableIndex) -> Self {
        self.global_secondary_indexes.push(index);
        self
    }

    pub fn with_local_secondary_index(mut self, index: TableIndex) -> Self {
        self.local_secondary_indexes.push(index);
        self
    }

    pub fn with_partition_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> Option<Value> + Send + Sync + 'static,
    {
        self.partition_key_fn = Some(Arc::new(f));
        self
    }

    pub fn with_sort_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> Option<Value> + Send + Sync + 'static,
    {
        self.sort_key_fn = Some(Arc::new(f));
        self
    }

    /// Sort key prefix `clear_table` restricts deletes to.
    pub fn with_sort_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sort_key_prefix = Some(prefix.into());
        self
    }

    /// Sanitizers and computed fields applied before every write.
    pub fn with_schema(mut self, schema: RecordSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        self.resource.name()
    }

    pub fn primary_index(&self) -> &TableIndex {
        &self.primary_index
    }

    pub fn table_keys(&self) -> TableKeys {
        self.primary_index.table_keys()
    }

    fn indexes(&self) -> impl Iterator<Item = &TableIndex> {
        std::iter::once(&self.primary_index)
            .chain(&self.global_secondary_indexes)
            .chain(&self.local_secondary_indexes)
    }

    /// Record column wins over the computing function.
    pub fn get_partition_key(&self, record: &Record) -> Result<Value> {
        let name = &self.primary_index.partition_key_name;
        if let Some(value) = record.get(name) {
            return Ok(value.clone());
        }
        self.partition_key_fn
            .as_ref()
            .and_then(|f| f(record))
            .ok_or_else(|| {
                Error::table_with_data(
                    format!("Cannot get partition key \"{}\" for record", name),
                    json!({ "key": name }),
                )
            })
    }

    /// `None` for tables without a sort key.
    pub fn get_sort_key(&self, record: &Record) -> Result<Option<Value>> {
        let Some(name) = &self.primary_index.sort_key_name else {
            return Ok(None);
        };
        if let Some(value) = record.get(name) {
            return Ok(Some(value.clone()));
        }
        self.sort_key_fn
            .as_ref()
            .and_then(|f| f(record))
            .map(Some)
            .ok_or_else(|| {
                Error::table_with_data(
                    format!("Cannot get sort key \"{}\" for record", name),
                    json!({ "key": name }),
                )
            })
    }

    /// Just the table key attributes of `record`.
    pub fn get_key(&self, record: &Record) -> Result<Record> {
        let mut key = Record::new();
        key.insert(
            self.primary_index.partition_key_name.clone(),
            self.get_partition_key(record)?,
        );
        if let (Some(name), Some(value)) =
            (&self.primary_index.sort_key_name, self.get_sort_key(record)?)
        {
            key.insert(name.clone(), value);
        }
        Ok(key)
    }

    /// Record with sanitizers applied and table keys filled in.
    fn keyed_record(&self, record: Record) -> Result<Record> {
        let mut record = self.schema.applied(record);
        let key = self.get_key(&record)?;
        record.update(&key);
        Ok(record)
    }

    fn validate_index_keys(&self, record: &Record) -> Result<()> {
        for index in self.indexes() {
            let keys = index.table_keys();
            for key in keys.names() {
                match record.get(key) {
                    Some(value) if *value != Value::Null => {}
                    _ => {
                        return Err(Error::table_with_data(
                            format!(
                                "Record has no value for \"{}\" required by index {}",
                                key,
                                index.raw_name()
                            ),
                            json!({ "index": index.raw_name(), "key": key }),
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    fn bind(&self, query: DynamoQuery) -> DynamoQuery {
        let mut query = query.with_config(self.config.clone());
        query.table(self.resource.clone(), Some(self.table_keys()));
        query
    }

    /// Stored item for the record's key, or `None`.
    pub fn get_record(&self, record: &Record) -> Result<Option<Record>> {
        let key = self.get_key(record)?;
        let mut query = self.bind(DynamoQuery::build_get_item());
        let result = query.execute_record(Some(key))?;
        let found = query
            .get_raw_responses()
            .iter()
            .any(|r| matches!(r, RawResponse::GetItem(output) if output.item.is_some()));
        if !found {
            return Ok(None);
        }
        result.get_record(0).map(Some)
    }

    /// Writes the record's attributes and returns the stored item.
    ///
    /// `dt_created` is only written when the stored item has none;
    /// `dt_modified` is refreshed on every call.
    pub fn upsert_record(
        &self,
        record: Record,
        condition: Option<AnyExpression>,
        extra_data: Option<&Record>,
    ) -> Result<Record> {
        let mut record = self.keyed_record(record)?;
        self.validate_index_keys(&record)?;

        let now = timestamp();
        if !record.contains_key(CREATED_FIELD) {
            record.insert(CREATED_FIELD, now.clone());
        }
        record.insert(MODIFIED_FIELD, now);

        let keys = self.table_keys();
        let update_keys: Vec<String> = record
            .keys()
            .filter(|k| !keys.contains(k) && *k != CREATED_FIELD)
            .map(str::to_string)
            .collect();

        let mut query = DynamoQuery::build_update_item()
            .update(update_keys)?
            .update_expression(UpdateExpression::new().set_if_not_exists([CREATED_FIELD]))?;
        if let Some(condition) = condition {
            query = query.condition(condition)?;
        }
        let mut query = self.bind(query);

        let mut data = record;
        if let Some(extra) = extra_data {
            data.update(extra);
        }
        let result = query.execute_record(Some(data))?;
        result.get_record(0)
    }

    /// Deletes the record's item; returns it when it existed.
    pub fn delete_record(
        &self,
        record: &Record,
        condition: Option<AnyExpression>,
    ) -> Result<Option<Record>> {
        let mut data = record.clone();
        data.update(&self.get_key(record)?);

        let mut query = DynamoQuery::build_delete_item();
        if let Some(condition) = condition {
            query = query.condition(condition)?;
        }
        let mut query = self.bind(query);
        let result = query.execute_record(Some(data))?;
        if result.is_empty() {
            return Ok(None);
        }
        result.get_record(0).map(Some)
    }

    /// Input rows merged with their stored items, in input order.
    pub fn batch_get(&self, data_table: &DataTable) -> Result<DataTable> {
        if data_table.is_empty() {
            return Ok(DataTable::new());
        }
        let mut get_table = DataTable::new();
        for record in set_records(data_table)? {
            let mut row = self.get_key(&record)?;
            row.update(&record);
            get_table.add_record(row)?;
        }
        let mut query = self.bind(DynamoQuery::build_batch_get_item());
        query.execute(&get_table)
    }

    /// Deletes items by computed key, repeated keys once.
    pub fn batch_delete(&self, data_table: &DataTable) -> Result<DataTable> {
        if data_table.is_empty() {
            return Ok(DataTable::new());
        }
        let mut delete_table = DataTable::new();
        for record in set_records(data_table)? {
            delete_table.add_record(self.get_key(&record)?)?;
        }
        let key_names = self.table_keys();
        let delete_table = delete_table.drop_duplicates_with(&key_names.names(), false)?;

        let mut query = self.bind(DynamoQuery::build_batch_delete_item());
        query.execute(&delete_table)
    }

    /// Merges every row over its stored item and writes the result.
    ///
    /// Rows repeating an earlier row's computed key are dropped.
    pub fn batch_upsert(&self, data_table: &DataTable) -> Result<DataTable> {
        if data_table.is_empty() {
            return Ok(DataTable::new());
        }
        let mut keyed = DataTable::new();
        for record in set_records(data_table)? {
            let record = self.keyed_record(record)?;
            self.validate_index_keys(&record)?;
            keyed.add_record(record)?;
        }
        let key_names = self.table_keys();
        let keyed = keyed.drop_duplicates_with(&key_names.names(), false)?;
        if keyed.len() < data_table.len() {
            debug!(
                dropped = data_table.len() - keyed.len(),
                "Dropped rows with repeated keys"
            );
        }

        let existing = self.batch_get(&keyed)?;
        let now = timestamp();
        let mut update_table = DataTable::new();
        for (index, stored) in set_records(&existing)?.into_iter().enumerate() {
            let updated = keyed.get_set_record(index)?;
            let mut row = stored.clone();
            row.update(&updated);
            let created = stored
                .get(CREATED_FIELD)
                .cloned()
                .unwrap_or_else(|| now.clone());
            row.insert(CREATED_FIELD, created);
            row.insert(MODIFIED_FIELD, now.clone());
            update_table.add_record(row)?;
        }

        let mut query = self.bind(DynamoQuery::build_batch_update_item());
        query.execute(&update_table)
    }

    /// Lazy scan over the whole table.
    pub fn scan(&self) -> ScanRequest<'_> {
        ScanRequest {
            table: self,
            filter: None,
            projection: Vec::new(),
            data: Record::new(),
            limit: None,
        }
    }

    /// Lazy query of one partition, on the primary index by default.
    pub fn query(&self, partition_key: impl Into<Value>) -> QueryRequest<'_> {
        QueryRequest {
            table: self,
            partition_key: partition_key.into(),
            index: self.primary_index.clone(),
            sort_key: None,
            sort_key_prefix: None,
            filter: None,
            scan_index_forward: true,
            projection: Vec::new(),
            data: Record::new(),
            limit: None,
        }
    }

    /// Deletes every item, or every item of one partition. The table's
    /// sort key prefix, if any, narrows a partition clear.
    pub fn clear_table(&self, partition_key: Option<Value>) -> Result<()> {
        info!(
            table = self.name(),
            partition_key = ?partition_key,
            sort_key_prefix = ?self.sort_key_prefix,
            "Clearing table"
        );
        let key_names: Vec<String> = self
            .table_keys()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let pager = match partition_key {
            None => self.scan().projection(key_names).execute()?,
            Some(partition_key) => {
                let mut request = self.query(partition_key).projection(key_names);
                if let Some(prefix) = &self.sort_key_prefix {
                    request = request.sort_key_prefix(prefix.clone());
                }
                request.execute()?
            }
        };

        let records = pager.collect::<Result<Vec<_>>>()?;
        if records.is_empty() {
            return Ok(());
        }
        let mut existing = DataTable::new();
        existing.add_records(records)?;
        let mut query = self.bind(DynamoQuery::build_batch_delete_item());
        query.execute(&existing)?;
        Ok(())
    }

    fn lifecycle(&self) -> Result<&Arc<dyn TableLifecycle>> {
        self.lifecycle.as_ref().ok_or_else(|| {
            Error::table(format!("{} has no lifecycle handle attached", self))
        })
    }

    /// Create-table request for the key schema and every secondary index.
    pub fn create_table_input(&self) -> CreateTableInput {
        let mut attribute_definitions: Vec<AttributeDefinition> = Vec::new();
        for definition in self.indexes().flat_map(|i| i.as_attribute_definitions()) {
            if !attribute_definitions
                .iter()
                .any(|d| d.attribute_name == definition.attribute_name)
            {
                attribute_definitions.push(definition);
            }
        }
        CreateTableInput {
            key_schema: self.primary_index.as_key_schema(),
            attribute_definitions,
            global_secondary_indexes: self
                .global_secondary_indexes
                .iter()
                .map(TableIndex::as_global_secondary_index)
                .collect(),
            local_secondary_indexes: self
                .local_secondary_indexes
                .iter()
                .map(TableIndex::as_local_secondary_index)
                .collect(),
            provisioned_throughput: None,
        }
    }

    pub fn create_table(&self) -> Result<()> {
        info!(table = self.name(), "Creating table");
        self.lifecycle()?.create_table(&self.create_table_input())
    }

    pub fn delete_table(&self) -> Result<()> {
        info!(table = self.name(), "Deleting table");
        self.lifecycle()?.delete_table()
    }

    pub fn table_status(&self) -> Result<TableStatus> {
        self.lifecycle()?.table_status()
    }

    /// Polls the table status until it is `ACTIVE`.
    pub fn wait_until_exists(&self) -> Result<()> {
        self.wait_for_status(TableStatus::Active)
    }

    /// Polls the table status until it is `NOT_FOUND`.
    pub fn wait_until_not_exists(&self) -> Result<()> {
        self.wait_for_status(TableStatus::NotFound)
    }

    fn wait_for_status(&self, expected: TableStatus) -> Result<()> {
        let lifecycle = self.lifecycle()?;
        let policy = self
            .config
            .retry
            .clone()
            .with_retryable_codes([TABLE_NOT_READY]);
        retry_with_policy(&policy, || {
            let status = lifecycle.table_status()?;
            debug!(table = self.name(), status = %status, "Polled table status");
            if status == expected {
                Ok(())
            } else {
                Err(Error::transport(
                    TABLE_NOT_READY,
                    format!("Table {} is {}, waiting for {}", self.name(), status, expected),
                ))
            }
        })
        .map_err(|e| match e {
            Error::Transport { code, message } if code == TABLE_NOT_READY => {
                Error::table_with_data(message, json!({ "expected": expected.to_string() }))
            }
            other => other,
        })
    }
}

impl fmt::Display for DynamoTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<DynamoTable name={}>", self.name())
    }
}

impl fmt::Debug for DynamoTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoTable")
            .field("name", &self.name())
            .field("primary_index", &self.primary_index)
            .field("global_secondary_indexes", &self.global_secondary_indexes)
            .field("local_secondary_indexes", &self.local_secondary_indexes)
            .field("sort_key_prefix", &self.sort_key_prefix)
            .finish()
    }
}

/// Scan builder returned by [`DynamoTable::scan`].
pub struct ScanRequest<'a> {
    table: &'a DynamoTable,
    filter: Option<AnyExpression>,
    projection: Vec<String>,
    data: Record,
    limit: Option<usize>,
}

impl<'a> ScanRequest<'a> {
    pub fn filter(mut self, expression: impl Into<AnyExpression>) -> Self {
        self.filter = Some(expression.into());
        self
    }

    pub fn projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Values the filter expression reads.
    pub fn data(mut self, data: Record) -> Self {
        self.data.update(&data);
        self
    }

    /// Stops after this many records.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn execute(self) -> Result<RecordPager> {
        let mut query = DynamoQuery::build_scan();
        if let Some(filter) = self.filter {
            query = query.filter(filter)?;
        }
        if !self.projection.is_empty() {
            query = query.projection(self.projection)?;
        }
        RecordPager::new(self.table, query, self.data, self.limit)
    }
}

/// Query builder returned by [`DynamoTable::query`].
pub struct QueryRequest<'a> {
    table: &'a DynamoTable,
    partition_key: Value,
    index: TableIndex,
    sort_key: Option<Value>,
    sort_key_prefix: Option<String>,
    filter: Option<AnyExpression>,
    scan_index_forward: bool,
    projection: Vec<String>,
    data: Record,
    limit: Option<usize>,
}

impl<'a> QueryRequest<'a> {
    pub fn index(mut self, index: &TableIndex) -> Self {
        self.index = index.clone();
        self
    }

    /// Exact sort key match.
    pub fn sort_key(mut self, sort_key: impl Into<Value>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    /// `begins_with` sort key match; wins over `sort_key`.
    pub fn sort_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sort_key_prefix = Some(prefix.into());
        self
    }

    pub fn filter(mut self, expression: impl Into<AnyExpression>) -> Self {
        self.filter = Some(expression.into());
        self
    }

    pub fn scan_index_forward(mut self, forward: bool) -> Self {
        self.scan_index_forward = forward;
        self
    }

    pub fn projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Values the filter expression reads.
    pub fn data(mut self, data: Record) -> Self {
        self.data.update(&data);
        self
    }

    /// Stops after this many records.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn execute(self) -> Result<RecordPager> {
        let (sort_key, prefixed) = match self.sort_key_prefix {
            Some(prefix) => (Some(Value::S(prefix)), true),
            None => (self.sort_key, false),
        };

        let partition = ConditionExpression::new(self.index.partition_key_name.clone());
        let key_condition: AnyExpression = match (&self.index.sort_key_name, &sort_key) {
            (Some(name), Some(_)) => {
                let sort = if prefixed {
                    ConditionExpression::begins_with(name.clone(), name.clone())
                } else {
                    ConditionExpression::new(name.clone())
                };
                partition.and(sort).into()
            }
            _ => partition.into(),
        };

        let mut query = DynamoQuery::build_query(key_condition)
            .scan_index_forward(self.scan_index_forward);
        if let Some(name) = self.index.name() {
            query = query.index_name(name);
        }
        if let Some(filter) = self.filter {
            query = query.filter(filter)?;
        }
        if !self.projection.is_empty() {
            query = query.projection(self.projection)?;
        }

        let mut data = self.index.get_query_data(self.partition_key, sort_key);
        data.update(&self.data);
        RecordPager::new(self.table, query, data, self.limit)
    }
}

/// Lazy iterator over scan or query results, one page per fetch.
pub struct RecordPager {
    query: DynamoQuery,
    data: Record,
    buffer: VecDeque<Record>,
    limit: Option<usize>,
    yielded: usize,
    failed: bool,
}

impl RecordPager {
    fn new(
        table: &DynamoTable,
        query: DynamoQuery,
        data: Record,
        limit: Option<usize>,
    ) -> Result<Self> {
        let page_size = table.config.max_page_size as u64;
        let query = table.bind(query).limit(page_size)?;
        Ok(Self {
            query,
            data,
            buffer: VecDeque::new(),
            limit,
            yielded: 0,
            failed: false,
        })
    }

    /// Cursor the next fetch resumes from.
    pub fn last_evaluated_key(&self) -> Option<&Record> {
        self.query.get_last_evaluated_key()
    }

    fn fetch_page(&mut self) -> Result<()> {
        let page = self.query.execute_record(Some(self.data.clone()))?;
        self.buffer.extend(set_records(&page)?);
        Ok(())
    }
}

impl Iterator for RecordPager {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.limit.is_some_and(|limit| self.yielded >= limit) {
            return None;
        }
        while self.buffer.is_empty() {
            if !self.query.has_more_results() {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.failed = true;
                return Some(Err(e));
            }
        }
        let record = self.buffer.pop_front()?;
        self.yielded += 1;
        Some(Ok(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTable;
    use dquery_core::{record, RetryPolicy};

    fn setup() -> (Arc<MemoryTable>, DynamoTable) {
        let memory = Arc::new(MemoryTable::new(
            "people",
            TableKeys::with_sort_key("pk", "sk"),
        ));
        let table = DynamoTable::new(memory.clone())
            .with_lifecycle(memory.clone())
            .with_partition_key(|r| r.get("email").cloned())
            .with_sort_key(|_| Some(Value::from("person")))
            .with_config(QueryConfig::default().with_retry(RetryPolicy::new(2, 0, 0, 2.0)));
        (memory, table)
    }

    fn person(email: &str, age: i64) -> Record {
        record! { "email" => email, "age" => age }
    }

    #[test]
    fn test_record_column_wins_over_key_function() {
        let (_, table) = setup();
        let record = record! { "pk" => "explicit", "email" => "a@x" };
        assert_eq!(table.get_partition_key(&record).unwrap(), Value::from("explicit"));
        assert_eq!(
            table.get_sort_key(&record).unwrap(),
            Some(Value::from("person"))
        );

        let bare = DynamoTable::new(Arc::new(MemoryTable::new("t", TableKeys::new("pk"))));
        let err = bare.get_partition_key(&Record::new()).unwrap_err();
        assert_eq!(err.code(), "TABLE_ERROR");
    }

    #[test]
    fn test_upsert_sets_created_once() {
        let (memory, table) = setup();
        let first = table.upsert_record(person("a@x", 30), None, None).unwrap();
        let created = first.get(CREATED_FIELD).cloned().unwrap();
        assert_eq!(first.get("pk"), Some(&Value::from("a@x")));
        assert_eq!(memory.len(), 1);

        let second = table.upsert_record(person("a@x", 31), None, None).unwrap();
        assert_eq!(second.get(CREATED_FIELD), Some(&created));
        assert_eq!(second.get("age"), Some(&Value::from(31)));
        assert!(second.get(MODIFIED_FIELD).is_some());
    }

    #[test]
    fn test_upsert_with_condition() {
        let (_, table) = setup();
        table.upsert_record(person("a@x", 30), None, None).unwrap();
        let condition = ConditionExpression::not_exists("pk");
        let err = table
            .upsert_record(person("a@x", 40), Some(condition.into()), None)
            .unwrap_err();
        assert!(matches!(err, Error::ConditionalCheckFailed(_)));

        let stored = table.get_record(&person("a@x", 0)).unwrap().unwrap();
        assert_eq!(stored.get("age"), Some(&Value::from(30)));
    }

    #[test]
    fn test_upsert_validates_index_keys() {
        let (_, table) = setup();
        let table = table.with_global_secondary_index(TableIndex::new("gsi_age", "age", None));
        let err = table
            .upsert_record(record! { "email" => "a@x" }, None, None)
            .unwrap_err();
        assert_eq!(err.code(), "TABLE_ERROR");
        assert!(err.to_string().contains("gsi_age"));
        assert_eq!(err.data().unwrap()["index"], "gsi_age");
    }

    #[test]
    fn test_get_and_delete_missing_record() {
        let (_, table) = setup();
        assert!(table.get_record(&person("nobody@x", 0)).unwrap().is_none());
        assert!(table.delete_record(&person("nobody@x", 0), None).unwrap().is_none());

        table.upsert_record(person("a@x", 30), None, None).unwrap();
        let deleted = table.delete_record(&person("a@x", 0), None).unwrap().unwrap();
        assert_eq!(deleted.get("age"), Some(&Value::from(30)));
    }

    #[test]
    fn test_get_key_only_record() {
        let (memory, table) = setup();
        memory.put(record! { "pk" => "a@x", "sk" => "person" }).unwrap();
        let stored = table.get_record(&person("a@x", 0)).unwrap().unwrap();
        assert_eq!(stored.get("pk"), Some(&Value::from("a@x")));
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn test_batch_upsert_dedups_and_merges() {
        let (memory, table) = setup();
        table.upsert_record(person("a@x", 30), None, None).unwrap();
        let created = memory
            .get(&record! { "pk" => "a@x", "sk" => "person" })
            .and_then(|item| item.get(CREATED_FIELD).cloned())
            .unwrap();

        let input = DataTable::from_records([
            record! { "email" => "a@x", "name" => "Ann" },
            record! { "email" => "b@x", "name" => "Bob" },
            record! { "email" => "a@x", "name" => "Again" },
        ]);
        let result = table.batch_upsert(&input).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(memory.len(), 2);

        let ann = memory.get(&record! { "pk" => "a@x", "sk" => "person" }).unwrap();
        assert_eq!(ann.get("name"), Some(&Value::from("Ann")));
        assert_eq!(ann.get("age"), Some(&Value::from(30)));
        assert_eq!(ann.get(CREATED_FIELD), Some(&created));
    }

    #[test]
    fn test_batch_get_and_delete() {
        let (memory, table) = setup();
        for (email, age) in [("a@x", 1), ("b@x", 2)] {
            table.upsert_record(person(email, age), None, None).unwrap();
        }
        let request = DataTable::from_records([
            record! { "email" => "b@x" },
            record! { "email" => "c@x" },
        ]);
        let result = table.batch_get(&request).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get_record(0).unwrap().get("age"), Some(&Value::from(2)));
        assert!(result.get_set_record(1).unwrap().get("age").is_none());

        table.batch_delete(&request).unwrap();
        assert_eq!(memory.len(), 1);
        assert!(table.batch_get(&DataTable::new()).unwrap().is_empty());
    }

    #[test]
    fn test_query_and_scan_pagers() {
        let memory = Arc::new(MemoryTable::new("events", TableKeys::with_sort_key("pk", "sk")));
        for i in 0..7 {
            memory
                .put(record! { "pk" => "p", "sk" => format!("evt#{}", i), "n" => i })
                .unwrap();
        }
        memory.put(record! { "pk" => "p", "sk" => "other", "n" => 99 }).unwrap();
        let table = DynamoTable::new(memory.clone())
            .with_config(QueryConfig::default().with_max_page_size(3));

        let records = table
            .query("p")
            .sort_key_prefix("evt#")
            .scan_index_forward(false)
            .execute()
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records.len(), 7);
        assert_eq!(records[0].get("n"), Some(&Value::from(6)));

        let limited: Vec<Record> = table
            .scan()
            .filter(ConditionExpression::gte("n", "min"))
            .data(record! { "min" => 2 })
            .limit(4)
            .execute()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(limited.len(), 4);

        let exact: Vec<Record> = table
            .query("p")
            .sort_key("other")
            .projection(["n"])
            .execute()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(exact, vec![record! { "n" => 99 }]);
    }

    #[test]
    fn test_clear_table() {
        let (memory, table) = setup();
        for email in ["a@x", "b@x", "c@x"] {
            table.upsert_record(person(email, 1), None, None).unwrap();
        }
        table.clear_table(Some(Value::from("b@x"))).unwrap();
        assert_eq!(memory.len(), 2);
        table.clear_table(None).unwrap();
        assert!(memory.is_empty());
        table.clear_table(None).unwrap();
    }

    #[test]
    fn test_lifecycle_delegation() {
        let (memory, table) = setup();
        let table = table
            .with_global_secondary_index(TableIndex::new("gsi_email", "email", Some("sk")));
        let input = table.create_table_input();
        assert_eq!(input.key_schema.len(), 2);
        let names: Vec<&str> = input
            .attribute_definitions
            .iter()
            .map(|d| d.attribute_name.as_str())
            .collect();
        assert_eq!(names, vec!["pk", "sk", "email"]);

        table.delete_table().unwrap();
        table.wait_until_not_exists().unwrap();
        assert!(table.wait_until_exists().is_err());
        table.create_table().unwrap();
        table.wait_until_exists().unwrap();
        assert_eq!(memory.table_status().unwrap(), TableStatus::Active);

        let detached = DynamoTable::new(memory);
        assert_eq!(detached.create_table().unwrap_err().code(), "TABLE_ERROR");
    }
}
