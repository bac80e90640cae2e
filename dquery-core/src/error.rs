use crate::record::Record;
use thiserror::Error;

/// Transport error codes the provider uses for throttling.
pub const THROTTLING_ERROR_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
];

#[derive(Error, Debug)]
pub enum Error {
    /// Expression is invalid for the supplied data.
    #[error("Expression error: {0}")]
    Expression(String),

    /// Structural misuse of a `DataTable`.
    #[error("DataTable error: {0}")]
    DataTable(String),

    /// Query builder misuse or invalid query input.
    #[error("Query error: {message}")]
    Query {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Table manager misuse or invalid record.
    #[error("Table error: {message}")]
    Table {
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Batch request items still unprocessed after the retry budget ran out.
    #[error("{} unprocessed items left after retries", items.len())]
    UnprocessedItems {
        items: Vec<Record>,
        response: serde_json::Value,
    },

    /// Error raised by the transport collaborator.
    #[error("Transport error {code}: {message}")]
    Transport { code: String, message: String },

    /// Provider-side expression could not be parsed or evaluated.
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    /// Conditional write rejected by the provider.
    #[error("Conditional check failed: {0}")]
    ConditionalCheckFailed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn query(message: impl Into<String>) -> Self {
        Error::Query {
            message: message.into(),
            data: None,
        }
    }

    pub fn query_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Error::Query {
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn table(message: impl Into<String>) -> Self {
        Error::Table {
            message: message.into(),
            data: None,
        }
    }

    pub fn table_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Error::Table {
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn transport(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Transport {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns a stable error code for this error variant.
    /// These codes are stable and can be used by clients for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Expression(_) => "EXPRESSION_ERROR",
            Error::DataTable(_) => "DATA_TABLE_ERROR",
            Error::Query { .. } => "QUERY_ERROR",
            Error::Table { .. } => "TABLE_ERROR",
            Error::UnprocessedItems { .. } => "UNPROCESSED_ITEMS",
            Error::Transport { .. } => "TRANSPORT_ERROR",
            Error::InvalidExpression(_) => "INVALID_EXPRESSION",
            Error::ConditionalCheckFailed(_) => "CONDITIONAL_CHECK_FAILED",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::Json(_) => "JSON_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if this error is potentially retryable.
    ///
    /// Only provider throttling and partial batch failures are transient;
    /// validation and misuse errors are deterministic.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { code, .. } => THROTTLING_ERROR_CODES.contains(&code.as_str()),
            Error::UnprocessedItems { .. } => true,

            Error::Expression(_) => false,
            Error::DataTable(_) => false,
            Error::Query { .. } => false,
            Error::Table { .. } => false,
            Error::InvalidExpression(_) => false,
            Error::ConditionalCheckFailed(_) => false,
            Error::InvalidArgument(_) => false,
            Error::Json(_) => false,
            Error::Internal(_) => false,
        }
    }

    /// Structured diagnostic payload attached to query and table errors.
    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Error::Query { data, .. } | Error::Table { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    /// Adds context to an error by wrapping it in an Internal error.
    ///
    /// Transport and unprocessed-item errors keep their kind so callers can
    /// still branch on them.
    ///
    /// # Examples
    ///
    /// ```
    /// use dquery_core::Error;
    ///
    /// let err = Error::DataTable("not normalized".into()).with_context("get_record");
    /// assert_eq!(err.code(), "INTERNAL_ERROR");
    /// ```
    pub fn with_context(self, context: &str) -> Error {
        match self {
            Error::Transport { code, message } => Error::Transport {
                code,
                message: format!("{}: {}", context, message),
            },
            e @ Error::UnprocessedItems { .. } => e,
            other => Error::Internal(format!("{}: {}", context, other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Expression("x".into()).code(), "EXPRESSION_ERROR");
        assert_eq!(Error::query("x").code(), "QUERY_ERROR");
        assert_eq!(Error::table("x").code(), "TABLE_ERROR");
        assert_eq!(Error::transport("Boom", "x").code(), "TRANSPORT_ERROR");
    }

    #[test]
    fn test_retryable_throttling_only() {
        assert!(Error::transport("ThrottlingException", "slow down").is_retryable());
        assert!(Error::transport("ProvisionedThroughputExceededException", "").is_retryable());
        assert!(!Error::transport("ValidationException", "bad").is_retryable());
        assert!(!Error::Expression("bad".into()).is_retryable());
        assert!(!Error::DataTable("bad".into()).is_retryable());
    }

    #[test]
    fn test_query_error_data() {
        let err = Error::query_with_data("missing", serde_json::json!({"key": "pk"}));
        assert_eq!(err.data(), Some(&serde_json::json!({"key": "pk"})));
        assert!(Error::query("plain").data().is_none());
    }

    #[test]
    fn test_with_context_keeps_transport_kind() {
        let err = Error::transport("ThrottlingException", "slow").with_context("scan");
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Transport error ThrottlingException: scan: slow");

        let err = Error::DataTable("broken".into()).with_context("merge");
        assert_eq!(err.to_string(), "Internal error: merge: DataTable error: broken");
    }
}
