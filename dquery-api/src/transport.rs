/// Transport seam between the query builder and a remote table
///
/// Requests carry rendered placeholder templates plus the `#name` / `:value`
/// substitution maps; responses mirror the provider's raw output shape,
/// including pagination cursors and unprocessed batch items.

use dquery_core::{Record, Result, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// `#name` -> attribute name
pub type AttributeNames = HashMap<String, String>;

/// `:value` -> literal value
pub type AttributeValues = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnValues {
    #[default]
    None,
    AllOld,
    UpdatedOld,
    AllNew,
    UpdatedNew,
}

impl ReturnValues {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnValues::None => "NONE",
            ReturnValues::AllOld => "ALL_OLD",
            ReturnValues::UpdatedOld => "UPDATED_OLD",
            ReturnValues::AllNew => "ALL_NEW",
            ReturnValues::UpdatedNew => "UPDATED_NEW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnConsumedCapacity {
    Indexes,
    Total,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnItemCollectionMetrics {
    Size,
    #[default]
    None,
}

/// Key attribute role in a table or index key schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyType {
    Hash,
    Range,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Hash => "HASH",
            KeyType::Range => "RANGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub key_type: KeyType,
}

impl KeySchemaElement {
    pub fn hash(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            key_type: KeyType::Hash,
        }
    }

    pub fn range(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            key_type: KeyType::Range,
        }
    }
}

/// Scalar attribute type in a key attribute definition (`S`, `N`, `B`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeDefinition {
    pub attribute_name: String,
    pub attribute_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisionedThroughput {
    pub read_capacity_units: u64,
    pub write_capacity_units: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectionType {
    All,
    KeysOnly,
    Include,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Projection {
    pub projection_type: ProjectionType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub non_key_attributes: Vec<String>,
}

/// Secondary index definition as sent in a create-table request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecondaryIndexDefinition {
    pub index_name: String,
    pub key_schema: Vec<KeySchemaElement>,
    pub projection: Projection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioned_throughput: Option<ProvisionedThroughput>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateTableInput {
    pub key_schema: Vec<KeySchemaElement>,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub global_secondary_indexes: Vec<SecondaryIndexDefinition>,
    pub local_secondary_indexes: Vec<SecondaryIndexDefinition>,
    pub provisioned_throughput: Option<ProvisionedThroughput>,
}

/// Lifecycle state reported for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    Creating,
    Updating,
    Deleting,
    Active,
    NotFound,
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableStatus::Creating => "CREATING",
            TableStatus::Updating => "UPDATING",
            TableStatus::Deleting => "DELETING",
            TableStatus::Active => "ACTIVE",
            TableStatus::NotFound => "NOT_FOUND",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanInput {
    pub filter_expression: Option<String>,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: AttributeNames,
    pub expression_attribute_values: AttributeValues,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Record>,
    pub consistent_read: bool,
    pub return_consumed_capacity: ReturnConsumedCapacity,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryInput {
    pub key_condition_expression: String,
    pub filter_expression: Option<String>,
    pub projection_expression: Option<String>,
    pub index_name: Option<String>,
    pub expression_attribute_names: AttributeNames,
    pub expression_attribute_values: AttributeValues,
    pub limit: Option<usize>,
    pub exclusive_start_key: Option<Record>,
    pub consistent_read: bool,
    pub scan_index_forward: bool,
    pub return_consumed_capacity: ReturnConsumedCapacity,
}

/// One page of a scan or query.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PageOutput {
    pub items: Vec<Record>,
    pub count: usize,
    pub scanned_count: usize,
    pub last_evaluated_key: Option<Record>,
    pub consumed_capacity: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemInput {
    pub key: Record,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: AttributeNames,
    pub consistent_read: bool,
    pub return_consumed_capacity: ReturnConsumedCapacity,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemOutput {
    pub item: Option<Record>,
    pub consumed_capacity: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateItemInput {
    pub key: Record,
    pub update_expression: String,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: AttributeNames,
    pub expression_attribute_values: AttributeValues,
    pub return_values: ReturnValues,
    pub return_consumed_capacity: ReturnConsumedCapacity,
    pub return_item_collection_metrics: ReturnItemCollectionMetrics,
}

/// Output shared by update and delete.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WriteItemOutput {
    pub attributes: Option<Record>,
    pub consumed_capacity: Option<serde_json::Value>,
    pub item_collection_metrics: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteItemInput {
    pub key: Record,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: AttributeNames,
    pub expression_attribute_values: AttributeValues,
    pub return_values: ReturnValues,
    pub return_consumed_capacity: ReturnConsumedCapacity,
    pub return_item_collection_metrics: ReturnItemCollectionMetrics,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchGetItemInput {
    pub table_name: String,
    pub keys: Vec<Record>,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: AttributeNames,
    pub consistent_read: bool,
    pub return_consumed_capacity: ReturnConsumedCapacity,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchGetItemOutput {
    pub responses: Vec<Record>,
    pub unprocessed_keys: Vec<Record>,
    pub consumed_capacity: Option<serde_json::Value>,
}

/// One entry of a batch write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WriteRequest {
    #[serde(rename = "PutRequest")]
    Put { item: Record },
    #[serde(rename = "DeleteRequest")]
    Delete { key: Record },
}

impl WriteRequest {
    pub fn put(item: Record) -> Self {
        WriteRequest::Put { item }
    }

    pub fn delete(key: Record) -> Self {
        WriteRequest::Delete { key }
    }
}

impl From<WriteRequest> for Record {
    fn from(request: WriteRequest) -> Self {
        match request {
            WriteRequest::Put { item } => item,
            WriteRequest::Delete { key } => key,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchWriteItemInput {
    pub table_name: String,
    pub requests: Vec<WriteRequest>,
    pub return_consumed_capacity: ReturnConsumedCapacity,
    pub return_item_collection_metrics: ReturnItemCollectionMetrics,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchWriteItemOutput {
    pub unprocessed_items: Vec<WriteRequest>,
    pub consumed_capacity: Option<serde_json::Value>,
    pub item_collection_metrics: Option<serde_json::Value>,
}

/// Provider output kept verbatim for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub enum RawResponse {
    Scan(PageOutput),
    Query(PageOutput),
    GetItem(GetItemOutput),
    UpdateItem(WriteItemOutput),
    DeleteItem(WriteItemOutput),
    BatchGetItem(BatchGetItemOutput),
    BatchWriteItem(BatchWriteItemOutput),
}

impl RawResponse {
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn consumed_capacity(&self) -> Option<&serde_json::Value> {
        match self {
            RawResponse::Scan(o) | RawResponse::Query(o) => o.consumed_capacity.as_ref(),
            RawResponse::GetItem(o) => o.consumed_capacity.as_ref(),
            RawResponse::UpdateItem(o) | RawResponse::DeleteItem(o) => o.consumed_capacity.as_ref(),
            RawResponse::BatchGetItem(o) => o.consumed_capacity.as_ref(),
            RawResponse::BatchWriteItem(o) => o.consumed_capacity.as_ref(),
        }
    }
}

/// Provider-shaped operations on a single remote table.
///
/// Implementations may be shared across queries; every method takes `&self`.
pub trait TableResource: Send + Sync {
    fn name(&self) -> &str;

    /// Declared primary key schema, used when table keys are not given.
    fn key_schema(&self) -> Result<Vec<KeySchemaElement>>;

    fn scan(&self, input: &ScanInput) -> Result<PageOutput>;

    fn query(&self, input: &QueryInput) -> Result<PageOutput>;

    fn get_item(&self, input: &GetItemInput) -> Result<GetItemOutput>;

    fn update_item(&self, input: &UpdateItemInput) -> Result<WriteItemOutput>;

    fn delete_item(&self, input: &DeleteItemInput) -> Result<WriteItemOutput>;

    fn batch_get_item(&self, input: &BatchGetItemInput) -> Result<BatchGetItemOutput>;

    fn batch_write_item(&self, input: &BatchWriteItemInput) -> Result<BatchWriteItemOutput>;
}

/// Table lifecycle calls; the table manager only delegates and polls.
pub trait TableLifecycle: Send + Sync {
    fn create_table(&self, input: &CreateTableInput) -> Result<()>;

    fn delete_table(&self) -> Result<()>;

    fn table_status(&self) -> Result<TableStatus>;
}

impl<T: TableResource + ?Sized> TableResource for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn key_schema(&self) -> Result<Vec<KeySchemaElement>> {
        (**self).key_schema()
    }

    fn scan(&self, input: &ScanInput) -> Result<PageOutput> {
        (**self).scan(input)
    }

    fn query(&self, input: &QueryInput) -> Result<PageOutput> {
        (**self).query(input)
    }

    fn get_item(&self, input: &GetItemInput) -> Result<GetItemOutput> {
        (**self).get_item(input)
    }

    fn update_item(&self, input: &UpdateItemInput) -> Result<WriteItemOutput> {
        (**self).update_item(input)
    }

    fn delete_item(&self, input: &DeleteItemInput) -> Result<WriteItemOutput> {
        (**self).delete_item(input)
    }

    fn batch_get_item(&self, input: &BatchGetItemInput) -> Result<BatchGetItemOutput> {
        (**self).batch_get_item(input)
    }

    fn batch_write_item(&self, input: &BatchWriteItemInput) -> Result<BatchWriteItemOutput> {
        (**self).batch_write_item(input)
    }
}

impl<T: TableLifecycle + ?Sized> TableLifecycle for Arc<T> {
    fn create_table(&self, input: &CreateTableInput) -> Result<()> {
        (**self).create_table(input)
    }

    fn delete_table(&self) -> Result<()> {
        (**self).delete_table()
    }

    fn table_status(&self) -> Result<TableStatus> {
        (**self).table_status()
    }
}
