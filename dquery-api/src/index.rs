/// Primary and secondary index descriptors
///
/// A `TableIndex` names the key attributes of the table itself (the
/// `primary` index) or of a GSI/LSI, and renders the key schema, attribute
/// definitions and index definitions a create-table call needs.

use crate::transport::{
    AttributeDefinition, KeySchemaElement, Projection, ProjectionType, ProvisionedThroughput,
    SecondaryIndexDefinition,
};
use dquery_core::{Record, TableKeys, Value};
use std::fmt;

/// Name reserved for the table's own key schema.
pub const PRIMARY_INDEX_NAME: &str = "primary";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIndex {
    name: String,
    pub partition_key_name: String,
    /// `S`, `N` or `B`
    pub partition_key_type: String,
    pub sort_key_name: Option<String>,
    pub sort_key_type: String,
    pub read_capacity_units: Option<u64>,
    pub write_capacity_units: Option<u64>,
    /// Non-key attributes projected into the index; empty projects all.
    pub projection: Vec<String>,
}

impl TableIndex {
    pub fn new(
        name: impl Into<String>,
        partition_key_name: impl Into<String>,
        sort_key_name: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            partition_key_name: partition_key_name.into(),
            partition_key_type: "S".to_string(),
            sort_key_name: sort_key_name.map(str::to_string),
            sort_key_type: "S".to_string(),
            read_capacity_units: None,
            write_capacity_units: None,
            projection: Vec::new(),
        }
    }

    /// The table's own keys.
    pub fn primary(partition_key_name: impl Into<String>, sort_key_name: Option<&str>) -> Self {
        Self::new(PRIMARY_INDEX_NAME, partition_key_name, sort_key_name)
    }

    pub fn with_partition_key_type(mut self, key_type: impl Into<String>) -> Self {
        self.partition_key_type = key_type.into();
        self
    }

    pub fn with_sort_key_type(mut self, key_type: impl Into<String>) -> Self {
        self.sort_key_type = key_type.into();
        self
    }

    pub fn with_capacity(mut self, read_capacity_units: u64, write_capacity_units: u64) -> Self {
        self.read_capacity_units = Some(read_capacity_units);
        self.write_capacity_units = Some(write_capacity_units);
        self
    }

    pub fn with_projection<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Index name to send in queries; `None` for the primary index.
    pub fn name(&self) -> Option<&str> {
        if self.is_primary() {
            None
        } else {
            Some(&self.name)
        }
    }

    pub fn raw_name(&self) -> &str {
        &self.name
    }

    pub fn is_primary(&self) -> bool {
        self.name == PRIMARY_INDEX_NAME
    }

    pub fn table_keys(&self) -> TableKeys {
        TableKeys {
            partition_key: self.partition_key_name.clone(),
            sort_key: self.sort_key_name.clone(),
        }
    }

    fn projection_definition(&self) -> Projection {
        if self.projection.is_empty() {
            Projection {
                projection_type: ProjectionType::All,
                non_key_attributes: Vec::new(),
            }
        } else {
            Projection {
                projection_type: ProjectionType::Include,
                non_key_attributes: self.projection.clone(),
            }
        }
    }

    pub fn as_key_schema(&self) -> Vec<KeySchemaElement> {
        let mut schema = vec![KeySchemaElement::hash(&self.partition_key_name)];
        if let Some(sort_key) = &self.sort_key_name {
            schema.push(KeySchemaElement::range(sort_key));
        }
        schema
    }

    pub fn as_attribute_definitions(&self) -> Vec<AttributeDefinition> {
        let mut definitions = vec![AttributeDefinition {
            attribute_name: self.partition_key_name.clone(),
            attribute_type: self.partition_key_type.clone(),
        }];
        if let Some(sort_key) = &self.sort_key_name {
            definitions.push(AttributeDefinition {
                attribute_name: sort_key.clone(),
                attribute_type: self.sort_key_type.clone(),
            });
        }
        definitions
    }

    /// Provisioned throughput is only set when both capacities are.
    pub fn as_global_secondary_index(&self) -> SecondaryIndexDefinition {
        let provisioned_throughput = match (self.read_capacity_units, self.write_capacity_units) {
            (Some(read), Some(write)) if read > 0 && write > 0 => Some(ProvisionedThroughput {
                read_capacity_units: read,
                write_capacity_units: write,
            }),
            _ => None,
        };
        SecondaryIndexDefinition {
            index_name: self.name.clone(),
            key_schema: self.as_key_schema(),
            projection: self.projection_definition(),
            provisioned_throughput,
        }
    }

    pub fn as_local_secondary_index(&self) -> SecondaryIndexDefinition {
        SecondaryIndexDefinition {
            index_name: self.name.clone(),
            key_schema: self.as_key_schema(),
            projection: self.projection_definition(),
            provisioned_throughput: None,
        }
    }

    /// Query-ready data with the partition key and, when this index has a
    /// sort key, the sort key value.
    pub fn get_query_data(&self, partition_key: impl Into<Value>, sort_key: Option<Value>) -> Record {
        let mut data = Record::new();
        data.insert(self.partition_key_name.clone(), partition_key);
        if let (Some(name), Some(value)) = (&self.sort_key_name, sort_key) {
            data.insert(name.clone(), value);
        }
        data
    }
}

impl fmt::Display for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<TableIndex name={}>", self.name)
    }
}
