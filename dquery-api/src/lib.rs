/// DynamoQuery API
///
/// Query builder, table manager façade and the transport seam they talk
/// through. `MemoryTable` implements the seam in-process.

pub use dquery_core::{Error as DQueryError, Value as DQueryValue};

pub mod format;
pub use format::{ExpressionName, FormattedRequest};

pub mod index;
pub use index::{TableIndex, PRIMARY_INDEX_NAME};

pub mod memory;
pub use memory::MemoryTable;

pub mod query;
pub use query::{DynamoQuery, QueryState, QueryType};

pub mod table;
pub use table::{DynamoTable, QueryRequest, RecordPager, ScanRequest};

pub mod transport;
pub use transport::{
    KeySchemaElement, RawResponse, ReturnConsumedCapacity, ReturnItemCollectionMetrics,
    ReturnValues, TableLifecycle, TableResource, TableStatus,
};
