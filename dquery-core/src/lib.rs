pub mod config;
pub mod data_table;
pub mod error;
pub mod evaluator; // in-memory evaluation of rendered expressions
pub mod expression;
pub mod json;
pub mod parser;
pub mod record;
pub mod retry;
pub mod sentinel;
pub mod types;
pub mod utils;

pub use config::QueryConfig;
pub use data_table::{Cell, DataTable};
pub use error::{Error, Result};
pub use record::{FromRecord, IntoRecord, Record, RecordSchema};
pub use retry::RetryPolicy;
pub use sentinel::{Sentinel, NOT_SET};
pub use types::*;
