/// Query builder and executor
///
/// A `DynamoQuery` maps one logical operation plus a table-keys declaration
/// onto provider calls. Input rows come from a `DataTable`; scans and
/// queries run once per row and paginate, item operations run once per
/// row, and batch operations chunk all rows and reassemble the results in
/// input order.

use crate::format::{self, ExpressionMap, ExpressionName, FormattedRequest};
use crate::transport::{
    BatchGetItemInput, BatchWriteItemInput, DeleteItemInput, GetItemInput, KeyType,
    QueryInput, RawResponse, ReturnConsumedCapacity, ReturnItemCollectionMetrics, ReturnValues,
    ScanInput, TableResource, UpdateItemInput, WriteRequest,
};
use dquery_core::expression::{AnyExpression, Expression, ProjectionExpression, UpdateExpression};
use dquery_core::retry::{retry_unprocessed, retry_with_policy, BatchOutcome};
use dquery_core::utils::chunkify;
use dquery_core::{json, DataTable, Error, QueryConfig, Record, Result, TableKeys};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Operation a query performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    Query,
    Scan,
    GetItem,
    UpdateItem,
    DeleteItem,
    BatchGetItem,
    BatchUpdateItem,
    BatchDeleteItem,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Query => "query",
            QueryType::Scan => "scan",
            QueryType::GetItem => "get_item",
            QueryType::UpdateItem => "update_item",
            QueryType::DeleteItem => "delete_item",
            QueryType::BatchGetItem => "batch_get_item",
            QueryType::BatchUpdateItem => "batch_update_item",
            QueryType::BatchDeleteItem => "batch_delete_item",
        }
    }

    pub fn is_paginated(&self) -> bool {
        matches!(self, QueryType::Query | QueryType::Scan)
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a query instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// Built, no table attached
    Unbound,
    /// Table attached, not executed since binding
    Bound,
    /// Executed at least once; pagination state is populated
    Executed,
}

#[derive(Debug, Clone)]
struct RequestOptions {
    index_name: Option<String>,
    consistent_read: bool,
    scan_index_forward: bool,
    return_values: ReturnValues,
    return_consumed_capacity: ReturnConsumedCapacity,
    return_item_collection_metrics: ReturnItemCollectionMetrics,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            index_name: None,
            consistent_read: false,
            scan_index_forward: true,
            return_values: ReturnValues::None,
            return_consumed_capacity: ReturnConsumedCapacity::None,
            return_item_collection_metrics: ReturnItemCollectionMetrics::None,
        }
    }
}

/// Builder and executor for one logical table operation.
///
/// # Examples
///
/// ```
/// use dquery_api::{DynamoQuery, MemoryTable};
/// use dquery_core::expression::ConditionExpression;
/// use dquery_core::{record, DataTable, TableKeys};
/// use std::sync::Arc;
///
/// let table = Arc::new(MemoryTable::new("users", TableKeys::new("pk")));
/// let mut query = DynamoQuery::build_batch_update_item();
/// query.table(table.clone(), Some(TableKeys::new("pk")));
/// query.execute(&DataTable::from_records([record! { "pk" => "a", "age" => 30 }])).unwrap();
///
/// let mut query = DynamoQuery::build_scan()
///     .filter(ConditionExpression::gt("age", "min_age"))
///     .unwrap();
/// query.table(table, None);
/// let result = query.execute_record(Some(record! { "min_age" => 18 })).unwrap();
/// assert_eq!(result.len(), 1);
/// ```
#[derive(Clone)]
pub struct DynamoQuery {
    query_type: QueryType,
    expressions: ExpressionMap,
    options: RequestOptions,
    limit: u64,
    exclusive_start_key: Option<Record>,
    last_evaluated_key: Option<Record>,
    was_executed: bool,
    raw_responses: Vec<RawResponse>,
    table_resource: Option<Arc<dyn TableResource>>,
    table_keys: Option<TableKeys>,
    config: QueryConfig,
}

impl DynamoQuery {
    fn new(query_type: QueryType) -> Self {
        let config = QueryConfig::default();
        Self {
            query_type,
            expressions: ExpressionMap::new(),
            options: RequestOptions::default(),
            limit: config.max_limit,
            exclusive_start_key: None,
            last_evaluated_key: None,
            was_executed: false,
            raw_responses: Vec::new(),
            table_resource: None,
            table_keys: None,
            config,
        }
    }

    /// Query by key condition, run once per input row.
    pub fn build_query(key_condition: impl Into<AnyExpression>) -> Self {
        let mut query = Self::new(QueryType::Query);
        query
            .expressions
            .insert(ExpressionName::KeyCondition, key_condition.into());
        query
    }

    /// Full-table scan, run once per input row.
    pub fn build_scan() -> Self {
        Self::new(QueryType::Scan)
    }

    /// Item lookup by table keys, one call per input row.
    pub fn build_get_item() -> Self {
        Self::new(QueryType::GetItem)
    }

    /// Update by table keys, one call per input row.
    ///
    /// Without an explicit update expression every fully set column that is
    /// not a table key is `SET`.
    pub fn build_update_item() -> Self {
        let mut query = Self::new(QueryType::UpdateItem);
        query.options.return_values = ReturnValues::AllNew;
        query
    }

    pub fn build_delete_item() -> Self {
        let mut query = Self::new(QueryType::DeleteItem);
        query.options.return_values = ReturnValues::AllOld;
        query
    }

    pub fn build_batch_get_item() -> Self {
        Self::new(QueryType::BatchGetItem)
    }

    /// Batch put of every row's set cells.
    pub fn build_batch_update_item() -> Self {
        Self::new(QueryType::BatchUpdateItem)
    }

    pub fn build_batch_delete_item() -> Self {
        Self::new(QueryType::BatchDeleteItem)
    }

    fn unsupported(&self, what: &str) -> Error {
        Error::query(format!("{} does not support {}", self, what))
    }

    fn require(self, allowed: &[QueryType], what: &str) -> Result<Self> {
        if allowed.contains(&self.query_type) {
            Ok(self)
        } else {
            Err(self.unsupported(what))
        }
    }

    /// Filter for queries and scans.
    pub fn filter(self, expression: impl Into<AnyExpression>) -> Result<Self> {
        let mut query = self.require(&[QueryType::Query, QueryType::Scan], "FilterExpression")?;
        query
            .expressions
            .insert(ExpressionName::Filter, expression.into());
        Ok(query)
    }

    /// Condition for item updates and deletes.
    pub fn condition(self, expression: impl Into<AnyExpression>) -> Result<Self> {
        let mut query = self.require(
            &[QueryType::UpdateItem, QueryType::DeleteItem],
            "ConditionExpression",
        )?;
        query
            .expressions
            .insert(ExpressionName::Condition, expression.into());
        Ok(query)
    }

    /// Adds attributes to the projection.
    pub fn projection<I, S>(self, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut query = self.require(
            &[QueryType::Query, QueryType::Scan, QueryType::GetItem],
            "ProjectionExpression",
        )?;
        let added = ProjectionExpression::new(fields);
        let projection = match query.expressions.remove(&ExpressionName::Projection) {
            Some(AnyExpression::Projection(existing)) => existing.merge(added),
            _ => added,
        };
        query
            .expressions
            .insert(ExpressionName::Projection, projection.into());
        Ok(query)
    }

    /// `SET` shorthand for the given data columns.
    pub fn update<I, S>(self, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_expression(UpdateExpression::new().set(keys))
    }

    /// Merges an update expression into the query's one.
    pub fn update_expression(self, update: UpdateExpression) -> Result<Self> {
        let mut query = self.require(&[QueryType::UpdateItem], "UpdateExpression")?;
        let update = match query.expressions.remove(&ExpressionName::Update) {
            Some(AnyExpression::Update(existing)) => existing.merge(update),
            _ => update,
        };
        query
            .expressions
            .insert(ExpressionName::Update, update.into());
        Ok(query)
    }

    /// Caps the number of items requested per input row.
    pub fn limit(self, limit: u64) -> Result<Self> {
        let mut query = self.require(&[QueryType::Query, QueryType::Scan], "Limit")?;
        if limit == 0 {
            return Err(Error::query("Limit must be greater than 0"));
        }
        query.limit = limit;
        Ok(query)
    }

    pub fn index_name(mut self, index_name: impl Into<String>) -> Self {
        self.options.index_name = Some(index_name.into());
        self
    }

    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.options.consistent_read = consistent_read;
        self
    }

    pub fn scan_index_forward(mut self, forward: bool) -> Self {
        self.options.scan_index_forward = forward;
        self
    }

    /// Cursor the first page starts after.
    pub fn exclusive_start_key(mut self, key: Record) -> Self {
        self.exclusive_start_key = Some(key.clone());
        self.last_evaluated_key = Some(key);
        self
    }

    pub fn return_values(mut self, return_values: ReturnValues) -> Self {
        self.options.return_values = return_values;
        self
    }

    pub fn return_consumed_capacity(mut self, value: ReturnConsumedCapacity) -> Self {
        self.options.return_consumed_capacity = value;
        self
    }

    pub fn return_item_collection_metrics(mut self, value: ReturnItemCollectionMetrics) -> Self {
        self.options.return_item_collection_metrics = value;
        self
    }

    pub fn with_config(mut self, config: QueryConfig) -> Self {
        if self.limit == self.config.max_limit {
            self.limit = config.max_limit;
        }
        self.config = config;
        self
    }

    /// Attaches a table. Without `table_keys` they are read from the key
    /// schema on first execution. Re-binding resets the pagination cursor.
    pub fn table(
        &mut self,
        table_resource: Arc<dyn TableResource>,
        table_keys: Option<TableKeys>,
    ) -> &mut Self {
        self.table_resource = Some(table_resource);
        self.table_keys = table_keys;
        self.reset_start_key();
        self
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn expressions(&self) -> &ExpressionMap {
        &self.expressions
    }

    pub fn table_keys(&self) -> Option<&TableKeys> {
        self.table_keys.as_ref()
    }

    pub fn state(&self) -> QueryState {
        if self.table_resource.is_none() {
            QueryState::Unbound
        } else if self.was_executed {
            QueryState::Executed
        } else {
            QueryState::Bound
        }
    }

    pub fn was_executed(&self) -> bool {
        self.was_executed
    }

    /// True before the first execution and while a page cursor remains.
    pub fn has_more_results(&self) -> bool {
        !self.was_executed || self.last_evaluated_key.is_some()
    }

    pub fn get_last_evaluated_key(&self) -> Option<&Record> {
        self.last_evaluated_key.as_ref()
    }

    /// Returns to the first page of the same bound query.
    pub fn reset_start_key(&mut self) {
        self.last_evaluated_key = self.exclusive_start_key.clone();
        self.was_executed = false;
    }

    /// Provider responses of the last execution, in call order.
    pub fn get_raw_responses(&self) -> &[RawResponse] {
        &self.raw_responses
    }

    /// Reads the table keys from the declared key schema.
    pub fn get_table_keys(table_resource: &dyn TableResource) -> Result<TableKeys> {
        let schema = table_resource.key_schema()?;
        let find = |key_type: KeyType| {
            schema
                .iter()
                .find(|e| e.key_type == key_type)
                .map(|e| e.attribute_name.clone())
        };
        let partition_key = find(KeyType::Hash).ok_or_else(|| {
            Error::query(format!(
                "Table {} has no HASH key in its key schema",
                table_resource.name()
            ))
        })?;
        Ok(TableKeys {
            partition_key,
            sort_key: find(KeyType::Range),
        })
    }

    /// Runs the operation for every row of a normalized table.
    pub fn execute(&mut self, data_table: &DataTable) -> Result<DataTable> {
        if !data_table.is_normalized() {
            return Err(Error::query("Input DataTable is not normalized."));
        }
        let records = (0..data_table.len())
            .map(|i| data_table.get_set_record(i))
            .collect::<Result<Vec<_>>>()?;
        self.execute_records(data_table, records)
    }

    /// Runs the operation for one row; `None` runs it once with no data.
    pub fn execute_record(&mut self, record: Option<Record>) -> Result<DataTable> {
        let record = record.unwrap_or_default();
        let data_table = DataTable::from_records([record.clone()]);
        self.execute_records(&data_table, vec![record])
    }

    fn execute_records(&mut self, data_table: &DataTable, records: Vec<Record>) -> Result<DataTable> {
        self.config.validate().map_err(Error::InvalidArgument)?;
        let resource = self.table_resource.clone().ok_or_else(|| {
            Error::query(format!("{} is not bound to a table, call `table` first", self))
        })?;

        let table_keys = match &self.table_keys {
            Some(keys) => keys.clone(),
            None => {
                warn!(
                    table = resource.name(),
                    "Table keys were not set, getting them from the key schema"
                );
                let keys = Self::get_table_keys(resource.as_ref())?;
                debug!(table_keys = %keys, "Got table keys");
                self.table_keys = Some(keys.clone());
                keys
            }
        };

        let expressions = self.effective_expressions(data_table, &table_keys)?;
        for expression in expressions.values() {
            expression.ensure_not_empty()?;
        }

        self.raw_responses.clear();
        debug!(
            query = %self,
            table = resource.name(),
            rows = records.len(),
            "Executing query"
        );

        let result = match self.query_type {
            QueryType::Query | QueryType::Scan => {
                self.validate_last_evaluated_key(&table_keys)?;
                self.validate_required_value_keys(&expressions, data_table)?;
                Self::validate_input_data(&expressions, &records)?;
                if self.query_type == QueryType::Query {
                    self.validate_key_condition(&expressions)?;
                }
                self.execute_paginated(resource.as_ref(), &expressions, &records)
            }
            QueryType::GetItem | QueryType::UpdateItem | QueryType::DeleteItem => {
                self.validate_table_keys(&table_keys, data_table)?;
                self.validate_required_value_keys(&expressions, data_table)?;
                Self::validate_input_data(&expressions, &records)?;
                self.execute_item_operation(resource.as_ref(), &expressions, &table_keys, &records)
            }
            QueryType::BatchGetItem => {
                self.validate_table_keys(&table_keys, data_table)?;
                self.execute_batch_get(resource.as_ref(), &expressions, &table_keys, &records)
            }
            QueryType::BatchUpdateItem | QueryType::BatchDeleteItem => {
                self.validate_table_keys(&table_keys, data_table)?;
                self.execute_batch_write(resource.as_ref(), &table_keys, &records)?;
                Ok(data_table.clone())
            }
        }?;

        self.was_executed = true;
        Ok(result)
    }

    /// Expressions for this run, with the update expression derived from
    /// the input columns when none was given.
    fn effective_expressions(
        &self,
        data_table: &DataTable,
        table_keys: &TableKeys,
    ) -> Result<ExpressionMap> {
        let mut expressions = self.expressions.clone();
        if self.query_type == QueryType::UpdateItem
            && !expressions.contains_key(&ExpressionName::Update)
        {
            let condition_values = expressions
                .get(&ExpressionName::Condition)
                .map(|e| e.get_format_values())
                .unwrap_or_default();
            let columns: Vec<&str> = data_table
                .get_column_names()
                .into_iter()
                .filter(|c| !table_keys.contains(c) && !condition_values.contains(*c))
                .collect();
            if columns.is_empty() {
                return Err(Error::query(format!(
                    "{} must have UpdateExpression or `update` method.",
                    self
                )));
            }
            expressions.insert(
                ExpressionName::Update,
                UpdateExpression::new().set(columns).into(),
            );
        }
        Ok(expressions)
    }

    fn validate_last_evaluated_key(&self, table_keys: &TableKeys) -> Result<()> {
        let Some(key) = &self.last_evaluated_key else {
            return Ok(());
        };
        if table_keys.names().iter().all(|k| key.contains_key(k)) {
            return Ok(());
        }
        let got: Vec<&str> = key.keys().collect();
        Err(Error::query_with_data(
            format!(
                "Expected ExclusiveStartKey to have {} keys, got {{{}}}",
                table_keys,
                got.join(", ")
            ),
            json::record_to_json(key),
        ))
    }

    fn validate_required_value_keys(
        &self,
        expressions: &ExpressionMap,
        data_table: &DataTable,
    ) -> Result<()> {
        for (name, expression) in expressions {
            for key in expression.get_format_values() {
                let problem = if !data_table.has_column(&key) {
                    "is missing in input data"
                } else if !data_table.has_set_column(&key) {
                    "has missing values in input data"
                } else {
                    continue;
                };
                return Err(Error::query_with_data(
                    format!(
                        "Column \"{}\" {}, but present in {} = \"{}\"",
                        key,
                        problem,
                        name,
                        expression.render()
                    ),
                    json!({ "column": key, "expression": name.as_str() }),
                ));
            }
        }
        Ok(())
    }

    fn validate_table_keys(&self, table_keys: &TableKeys, data_table: &DataTable) -> Result<()> {
        for key in table_keys.names() {
            let problem = if !data_table.has_column(key) {
                "is missing in input data"
            } else if !data_table.has_set_column(key) {
                "has missing values in input data"
            } else {
                continue;
            };
            return Err(Error::query_with_data(
                format!(
                    "Column \"{}\" {}, but present in table keys {}",
                    key, problem, table_keys
                ),
                json!({ "column": key }),
            ));
        }
        Ok(())
    }

    fn validate_key_condition(&self, expressions: &ExpressionMap) -> Result<()> {
        let Some(key_condition) = expressions.get(&ExpressionName::KeyCondition) else {
            return Err(Error::query(format!("{} has no KeyConditionExpression", self)));
        };
        match key_condition
            .get_operators()
            .into_iter()
            .find(|op| !op.is_key_operator())
        {
            Some(operator) => Err(Error::query(format!(
                "KeyConditionExpression does not support operator \"{}\".",
                operator
            ))),
            None => Ok(()),
        }
    }

    /// Every row against every expression, before anything is sent.
    fn validate_input_data(expressions: &ExpressionMap, records: &[Record]) -> Result<()> {
        for record in records {
            for expression in expressions.values() {
                expression.validate_input_data(record)?;
            }
        }
        Ok(())
    }

    fn execute_paginated(
        &mut self,
        resource: &dyn TableResource,
        expressions: &ExpressionMap,
        records: &[Record],
    ) -> Result<DataTable> {
        let start_key = self.last_evaluated_key.clone();
        let mut result = DataTable::new();
        for record in records {
            self.last_evaluated_key = start_key.clone();
            let request = format::build_request(expressions, record)?;
            let pages = self.execute_paginated_record(resource, &request)?;
            result.add_table(&[&pages])?;
        }
        Ok(result)
    }

    fn execute_paginated_record(
        &mut self,
        resource: &dyn TableResource,
        request: &FormattedRequest,
    ) -> Result<DataTable> {
        let mut result = DataTable::new();
        let mut limit = self.limit;
        loop {
            let page_limit = limit.min(self.config.max_page_size as u64);
            let page_size = Some(page_limit as usize);
            let exclusive_start_key = self.last_evaluated_key.clone();

            let output = if self.query_type == QueryType::Query {
                let input = QueryInput {
                    key_condition_expression: request
                        .get(ExpressionName::KeyCondition)
                        .unwrap_or_default(),
                    filter_expression: request.get(ExpressionName::Filter),
                    projection_expression: request.get(ExpressionName::Projection),
                    index_name: self.options.index_name.clone(),
                    expression_attribute_names: request.names.clone(),
                    expression_attribute_values: request.values.clone(),
                    limit: page_size,
                    exclusive_start_key,
                    consistent_read: self.options.consistent_read,
                    scan_index_forward: self.options.scan_index_forward,
                    return_consumed_capacity: self.options.return_consumed_capacity,
                };
                let output = retry_with_policy(&self.config.retry, || resource.query(&input))?;
                self.raw_responses.push(RawResponse::Query(output.clone()));
                output
            } else {
                let input = ScanInput {
                    filter_expression: request.get(ExpressionName::Filter),
                    projection_expression: request.get(ExpressionName::Projection),
                    expression_attribute_names: request.names.clone(),
                    expression_attribute_values: request.values.clone(),
                    limit: page_size,
                    exclusive_start_key,
                    consistent_read: self.options.consistent_read,
                    return_consumed_capacity: self.options.return_consumed_capacity,
                };
                let output = retry_with_policy(&self.config.retry, || resource.scan(&input))?;
                self.raw_responses.push(RawResponse::Scan(output.clone()));
                output
            };

            debug!(
                items = output.items.len(),
                scanned = output.scanned_count,
                more = output.last_evaluated_key.is_some(),
                "Fetched page"
            );
            self.last_evaluated_key = output.last_evaluated_key;
            result.add_records(output.items)?;

            limit = limit.saturating_sub(page_limit);
            if self.last_evaluated_key.is_none() || limit == 0 {
                break;
            }
        }
        Ok(result)
    }

    fn execute_item_operation(
        &mut self,
        resource: &dyn TableResource,
        expressions: &ExpressionMap,
        table_keys: &TableKeys,
        records: &[Record],
    ) -> Result<DataTable> {
        let key_names = table_keys.names();
        let mut result = DataTable::new();
        for record in records {
            let request = format::build_request(expressions, record)?;
            let key = record.filter_keys(&key_names);

            let row = match self.query_type {
                QueryType::GetItem => {
                    let input = GetItemInput {
                        key,
                        projection_expression: request.get(ExpressionName::Projection),
                        expression_attribute_names: request.names,
                        consistent_read: self.options.consistent_read,
                        return_consumed_capacity: self.options.return_consumed_capacity,
                    };
                    let output =
                        retry_with_policy(&self.config.retry, || resource.get_item(&input))?;
                    self.raw_responses.push(RawResponse::GetItem(output.clone()));
                    let mut row = record.clone();
                    if let Some(item) = &output.item {
                        row.update(item);
                    }
                    Some(row)
                }
                QueryType::UpdateItem => {
                    let update_expression =
                        request.get(ExpressionName::Update).ok_or_else(|| {
                            Error::query(format!(
                                "{} must have UpdateExpression or `update` method.",
                                self
                            ))
                        })?;
                    let input = UpdateItemInput {
                        key,
                        update_expression,
                        condition_expression: request.get(ExpressionName::Condition),
                        expression_attribute_names: request.names,
                        expression_attribute_values: request.values,
                        return_values: self.options.return_values,
                        return_consumed_capacity: self.options.return_consumed_capacity,
                        return_item_collection_metrics: self
                            .options
                            .return_item_collection_metrics,
                    };
                    let output =
                        retry_with_policy(&self.config.retry, || resource.update_item(&input))?;
                    self.raw_responses
                        .push(RawResponse::UpdateItem(output.clone()));
                    output.attributes
                }
                QueryType::DeleteItem => {
                    let input = DeleteItemInput {
                        key,
                        condition_expression: request.get(ExpressionName::Condition),
                        expression_attribute_names: request.names,
                        expression_attribute_values: request.values,
                        return_values: self.options.return_values,
                        return_consumed_capacity: self.options.return_consumed_capacity,
                        return_item_collection_metrics: self
                            .options
                            .return_item_collection_metrics,
                    };
                    let output =
                        retry_with_policy(&self.config.retry, || resource.delete_item(&input))?;
                    self.raw_responses
                        .push(RawResponse::DeleteItem(output.clone()));
                    output.attributes
                }
                other => {
                    return Err(Error::Internal(format!(
                        "{} is not an item operation",
                        other
                    )))
                }
            };
            if let Some(row) = row {
                result.add_record(row)?;
            }
        }
        Ok(result)
    }

    fn execute_batch_get(
        &mut self,
        resource: &dyn TableResource,
        expressions: &ExpressionMap,
        table_keys: &TableKeys,
        records: &[Record],
    ) -> Result<DataTable> {
        let key_names = table_keys.names();
        let request = format::build_request(expressions, &Record::new())?;
        let keys: Vec<Record> = records.iter().map(|r| r.filter_keys(&key_names)).collect();
        let chunks = chunkify(keys, self.config.max_batch_size);
        debug!(rows = records.len(), chunks = chunks.len(), "Sending batch get");

        let policy = self.config.retry.clone();
        let options = self.options.clone();
        let raw_responses = &mut self.raw_responses;
        let mut found: HashMap<String, Record> = HashMap::new();
        for chunk in chunks {
            retry_unprocessed(&policy, chunk, |keys| {
                let input = BatchGetItemInput {
                    table_name: resource.name().to_string(),
                    keys,
                    projection_expression: request.get(ExpressionName::Projection),
                    expression_attribute_names: request.names.clone(),
                    consistent_read: options.consistent_read,
                    return_consumed_capacity: options.return_consumed_capacity,
                };
                let output = retry_with_policy(&policy, || resource.batch_get_item(&input))?;
                for item in &output.responses {
                    found.insert(key_fingerprint(item, &key_names)?, item.clone());
                }
                let unprocessed = output.unprocessed_keys.clone();
                let raw = RawResponse::BatchGetItem(output);
                let response = raw.to_json()?;
                raw_responses.push(raw);
                Ok(BatchOutcome {
                    unprocessed,
                    response,
                })
            })?;
        }

        let mut result = DataTable::new();
        for record in records {
            let mut row = record.clone();
            if let Some(item) = found.get(&key_fingerprint(record, &key_names)?) {
                row.update(item);
            }
            result.add_record(row)?;
        }
        Ok(result)
    }

    fn execute_batch_write(
        &mut self,
        resource: &dyn TableResource,
        table_keys: &TableKeys,
        records: &[Record],
    ) -> Result<()> {
        let key_names = table_keys.names();
        let requests: Vec<WriteRequest> = records
            .iter()
            .map(|r| match self.query_type {
                QueryType::BatchDeleteItem => WriteRequest::delete(r.filter_keys(&key_names)),
                _ => WriteRequest::put(r.clone()),
            })
            .collect();
        let chunks = chunkify(requests, self.config.max_batch_size);
        debug!(rows = records.len(), chunks = chunks.len(), "Sending batch write");

        let policy = self.config.retry.clone();
        let options = self.options.clone();
        let is_delete = self.query_type == QueryType::BatchDeleteItem;
        let raw_responses = &mut self.raw_responses;
        for chunk in chunks {
            let chunk = if is_delete {
                dedup_delete_requests(chunk, &key_names)?
            } else {
                chunk
            };
            retry_unprocessed(&policy, chunk, |requests| {
                let input = BatchWriteItemInput {
                    table_name: resource.name().to_string(),
                    requests,
                    return_consumed_capacity: options.return_consumed_capacity,
                    return_item_collection_metrics: options.return_item_collection_metrics,
                };
                let output = retry_with_policy(&policy, || resource.batch_write_item(&input))?;
                let unprocessed = output.unprocessed_items.clone();
                let raw = RawResponse::BatchWriteItem(output);
                let response = raw.to_json()?;
                raw_responses.push(raw);
                Ok(BatchOutcome {
                    unprocessed,
                    response,
                })
            })?;
        }
        Ok(())
    }
}

/// Stable identity of a record's key attributes.
fn key_fingerprint(record: &Record, key_names: &[&str]) -> Result<String> {
    json::dumps(&record.filter_keys(key_names))
}

fn dedup_delete_requests(requests: Vec<WriteRequest>, key_names: &[&str]) -> Result<Vec<WriteRequest>> {
    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(requests.len());
    for request in requests {
        let fingerprint = match &request {
            WriteRequest::Delete { key } => key_fingerprint(key, key_names)?,
            WriteRequest::Put { item } => json::dumps(item)?,
        };
        if seen.insert(fingerprint) {
            result.push(request);
        }
    }
    Ok(result)
}

impl fmt::Display for DynamoQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<DynamoQuery type={}>", self.query_type)
    }
}

impl fmt::Debug for DynamoQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoQuery")
            .field("query_type", &self.query_type)
            .field("state", &self.state())
            .field("expressions", &self.expressions)
            .field("limit", &self.limit)
            .field("table_keys", &self.table_keys)
            .field("last_evaluated_key", &self.last_evaluated_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTable;
    use dquery_core::expression::ConditionExpression;
    use dquery_core::{record, RetryPolicy, Value};

    fn users() -> Arc<MemoryTable> {
        let table = Arc::new(MemoryTable::new("users", TableKeys::with_sort_key("pk", "sk")));
        for (pk, sk, age) in [("u", "1", 20), ("u", "2", 30), ("u", "3", 40), ("v", "1", 50)] {
            table
                .put(record! { "pk" => pk, "sk" => sk, "age" => age })
                .unwrap();
        }
        table
    }

    fn bound(mut query: DynamoQuery, table: &Arc<MemoryTable>) -> DynamoQuery {
        query.table(table.clone(), Some(TableKeys::with_sort_key("pk", "sk")));
        query
    }

    #[test]
    fn test_display_and_state() {
        let mut query = DynamoQuery::build_scan();
        assert_eq!(query.to_string(), "<DynamoQuery type=scan>");
        assert_eq!(query.state(), QueryState::Unbound);
        assert!(query.has_more_results());

        let table = users();
        query.table(table, None);
        assert_eq!(query.state(), QueryState::Bound);
        query.execute_record(None).unwrap();
        assert_eq!(query.state(), QueryState::Executed);
        assert!(!query.has_more_results());
    }

    #[test]
    fn test_execute_requires_table() {
        let mut query = DynamoQuery::build_scan();
        let err = query.execute_record(None).unwrap_err();
        assert!(err.to_string().contains("not bound"));
    }

    #[test]
    fn test_shortcut_misuse() {
        let err = DynamoQuery::build_update_item().projection(["a"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query error: <DynamoQuery type=update_item> does not support ProjectionExpression"
        );
        assert!(DynamoQuery::build_get_item().limit(5).is_err());
        assert!(DynamoQuery::build_scan().update(["a"]).is_err());
        assert!(DynamoQuery::build_get_item().filter(ConditionExpression::new("a")).is_err());
        assert!(DynamoQuery::build_scan().limit(0).is_err());
    }

    #[test]
    fn test_query_with_filter_and_projection() {
        let table = users();
        let query = DynamoQuery::build_query(ConditionExpression::new("pk"))
            .filter(ConditionExpression::gte("age", "min_age"))
            .unwrap()
            .projection(["sk", "age"])
            .unwrap();
        let mut query = bound(query, &table);
        let result = query
            .execute_record(Some(record! { "pk" => "u", "min_age" => 30 }))
            .unwrap();
        assert_eq!(result.get_column("sk").unwrap(), vec![Value::from("2"), Value::from("3")]);
        assert!(!result.has_column("pk"));
        assert_eq!(query.get_raw_responses().len(), 1);
    }

    #[test]
    fn test_query_rejects_non_key_operator() {
        let table = users();
        let mut query = bound(
            DynamoQuery::build_query(ConditionExpression::new("pk") & ConditionExpression::ne("sk", "sk")),
            &table,
        );
        let err = query
            .execute_record(Some(record! { "pk" => "u", "sk" => "1" }))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query error: KeyConditionExpression does not support operator \"<>\"."
        );
        assert!(query.get_raw_responses().is_empty());
    }

    #[test]
    fn test_missing_value_column() {
        let table = users();
        let mut query = bound(DynamoQuery::build_query(ConditionExpression::new("pk")), &table);
        let err = query.execute_record(Some(record! { "other" => 1 })).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query error: Column \"pk\" is missing in input data, \
             but present in KeyConditionExpression = \"{pk} = {pk__value}\""
        );
        assert_eq!(err.data().map(|d| d["column"].clone()), Some(json!("pk")));

        let mut data = DataTable::new();
        data.add_records([record! { "pk" => "u" }, record! { "x" => 1 }]).unwrap();
        let err = query.execute(&data).unwrap_err();
        assert!(err.to_string().contains("has missing values in input data"));
    }

    #[test]
    fn test_not_normalized_input() {
        let table = users();
        let mut query = bound(DynamoQuery::build_scan(), &table);
        let mut data = DataTable::new();
        data.append("a", vec![1, 2]);
        data.append("b", vec![1]);
        let err = query.execute(&data).unwrap_err();
        assert_eq!(err.to_string(), "Query error: Input DataTable is not normalized.");
    }

    #[test]
    fn test_scan_pagination_with_limit() {
        let table = users();
        let config = QueryConfig::new().with_max_page_size(2);
        let mut query = bound(
            DynamoQuery::build_scan().limit(3).unwrap().with_config(config),
            &table,
        );
        let result = query.execute_record(None).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(query.get_raw_responses().len(), 2);
        assert!(query.has_more_results());
        assert!(query.get_last_evaluated_key().is_some());

        let rest = query.execute_record(None).unwrap();
        assert_eq!(rest.len(), 1);
        assert!(!query.has_more_results());

        query.reset_start_key();
        assert!(query.has_more_results());
        assert!(query.get_last_evaluated_key().is_none());
    }

    #[test]
    fn test_invalid_exclusive_start_key() {
        let table = users();
        let mut query = bound(
            DynamoQuery::build_scan().exclusive_start_key(record! { "pk" => "u" }),
            &table,
        );
        let err = query.execute_record(None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query error: Expected ExclusiveStartKey to have {pk, sk} keys, got {pk}"
        );
    }

    #[test]
    fn test_table_keys_from_schema() {
        let table = users();
        let mut query = DynamoQuery::build_get_item();
        query.table(table, None);
        let result = query
            .execute_record(Some(record! { "pk" => "u", "sk" => "2" }))
            .unwrap();
        assert_eq!(query.table_keys(), Some(&TableKeys::with_sort_key("pk", "sk")));
        assert_eq!(result.get_record(0).unwrap().get("age"), Some(&Value::from(30)));
    }

    #[test]
    fn test_get_item_keeps_unmatched_rows() {
        let table = users();
        let mut query = bound(DynamoQuery::build_get_item(), &table);
        let data = DataTable::from_records([
            record! { "pk" => "u", "sk" => "1", "note" => "first" },
            record! { "pk" => "x", "sk" => "9", "note" => "missing" },
        ]);
        let result = query.execute(&data).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get_record(0).unwrap().get("age"), Some(&Value::from(20)));
        assert_eq!(result.get_set_record(1).unwrap(), data.get_record(1).unwrap());
    }

    #[test]
    fn test_item_operations_need_table_keys() {
        let table = users();
        let mut query = bound(DynamoQuery::build_get_item(), &table);
        let err = query.execute_record(Some(record! { "pk" => "u" })).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query error: Column \"sk\" is missing in input data, but present in table keys {pk, sk}"
        );
    }

    #[test]
    fn test_update_item_explicit_and_derived() {
        let table = users();
        let mut query = bound(
            DynamoQuery::build_update_item().update(["age"]).unwrap(),
            &table,
        );
        let result = query
            .execute_record(Some(record! { "pk" => "u", "sk" => "1", "age" => 21, "extra" => 1 }))
            .unwrap();
        assert_eq!(result.get_record(0).unwrap().get("age"), Some(&Value::from(21)));
        assert_eq!(table.get(&record! { "pk" => "u", "sk" => "1" }).and_then(|r| r.get("extra").cloned()), None);

        let mut derived = bound(DynamoQuery::build_update_item(), &table);
        derived
            .execute_record(Some(record! { "pk" => "u", "sk" => "1", "extra" => 2 }))
            .unwrap();
        let stored = table.get(&record! { "pk" => "u", "sk" => "1" }).unwrap();
        assert_eq!(stored.get("extra"), Some(&Value::from(2)));

        let mut nothing = bound(DynamoQuery::build_update_item(), &table);
        let err = nothing
            .execute_record(Some(record! { "pk" => "u", "sk" => "1" }))
            .unwrap_err();
        assert!(err.to_string().contains("must have UpdateExpression"));
    }

    #[test]
    fn test_derived_update_rejects_partial_column() {
        let table = users();
        let mut rows = DataTable::new();
        rows.add_record(record! { "pk" => "u", "sk" => "1", "age" => 22, "nick" => "x" })
            .unwrap();
        rows.add_record(record! { "pk" => "u", "sk" => "2", "age" => 33 }).unwrap();

        let mut query = bound(DynamoQuery::build_update_item(), &table);
        let err = query.execute(&rows).unwrap_err();
        assert_eq!(err.code(), "QUERY_ERROR");
        assert!(err.to_string().contains("\"nick\" has missing values in input data"));
        let stored = table.get(&record! { "pk" => "u", "sk" => "1" }).unwrap();
        assert_eq!(stored.get("age"), Some(&Value::from(20)));
    }

    #[test]
    fn test_update_item_invalid_add_value() {
        let table = users();
        let mut query = bound(
            DynamoQuery::build_update_item()
                .update_expression(UpdateExpression::new().add(["age"]))
                .unwrap(),
            &table,
        );
        let err = query
            .execute_record(Some(record! { "pk" => "u", "sk" => "1", "age" => "old" }))
            .unwrap_err();
        assert!(matches!(err, Error::Expression(_)));
        assert_eq!(err.code(), "EXPRESSION_ERROR");
    }

    #[test]
    fn test_update_item_condition_failure() {
        let table = users();
        let mut query = bound(
            DynamoQuery::build_update_item()
                .update(["age"])
                .unwrap()
                .condition(ConditionExpression::eq("age", "expected"))
                .unwrap(),
            &table,
        );
        let err = query
            .execute_record(Some(record! { "pk" => "u", "sk" => "1", "age" => 99, "expected" => 1 }))
            .unwrap_err();
        assert_eq!(err.code(), "CONDITIONAL_CHECK_FAILED");
    }

    #[test]
    fn test_delete_item_returns_old() {
        let table = users();
        let mut query = bound(DynamoQuery::build_delete_item(), &table);
        let result = query
            .execute_record(Some(record! { "pk" => "u", "sk" => "1" }))
            .unwrap();
        assert_eq!(result.get_record(0).unwrap().get("age"), Some(&Value::from(20)));
        assert!(table.get(&record! { "pk" => "u", "sk" => "1" }).is_none());

        let result = query
            .execute_record(Some(record! { "pk" => "u", "sk" => "1" }))
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_batch_get_keeps_input_order() {
        let table = users();
        let mut query = bound(DynamoQuery::build_batch_get_item(), &table);
        let data = DataTable::from_records([
            record! { "pk" => "v", "sk" => "1" },
            record! { "pk" => "zz", "sk" => "0" },
            record! { "pk" => "u", "sk" => "2" },
        ]);
        let result = query.execute(&data).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(
            result.get_column("age").unwrap(),
            vec![Value::from(50), Value::Null, Value::from(30)]
        );
    }

    #[test]
    fn test_batch_write_and_delete() {
        let table = users();
        let mut put = bound(DynamoQuery::build_batch_update_item(), &table);
        let data = DataTable::from_records((0..30).map(|i| {
            record! { "pk" => "w", "sk" => format!("{:02}", i), "n" => i }
        }));
        let returned = put.execute(&data).unwrap();
        assert_eq!(returned.len(), 30);
        assert_eq!(put.get_raw_responses().len(), 2);
        assert_eq!(table.len(), 34);

        let mut delete = bound(DynamoQuery::build_batch_delete_item(), &table);
        let keys = DataTable::from_records([
            record! { "pk" => "w", "sk" => "00" },
            record! { "pk" => "w", "sk" => "00" },
            record! { "pk" => "w", "sk" => "01" },
        ]);
        delete.execute(&keys).unwrap();
        assert_eq!(table.len(), 32);
    }

    #[test]
    fn test_config_validated_on_execute() {
        let table = users();
        let mut query = bound(
            DynamoQuery::build_batch_get_item()
                .with_config(QueryConfig::new().with_max_batch_size(100).with_retry(RetryPolicy::no_retry())),
            &table,
        );
        let err = query
            .execute_record(Some(record! { "pk" => "u", "sk" => "1" }))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_rebinding_resets_cursor() {
        let table = users();
        let config = QueryConfig::new().with_max_page_size(1);
        let mut query = bound(
            DynamoQuery::build_scan().limit(1).unwrap().with_config(config),
            &table,
        );
        query.execute_record(None).unwrap();
        assert!(query.get_last_evaluated_key().is_some());
        query.table(table.clone(), None);
        assert!(query.get_last_evaluated_key().is_none());
        assert_eq!(query.state(), QueryState::Bound);
    }
}
