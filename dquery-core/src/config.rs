use crate::retry::RetryPolicy;

/// Largest page a single scan/query request may ask for.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Provider ceiling for items in one batch request.
pub const MAX_BATCH_SIZE: usize = 25;

/// Limit meaning "read everything".
pub const MAX_LIMIT: u64 = 10_000_000_000;

/// Query configuration for provider limits and retry behavior
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Page size cap for scan/query requests
    pub max_page_size: usize,

    /// Chunk size for batch get/write requests
    pub max_batch_size: usize,

    /// Default (and maximum) result limit for scan/query
    pub max_limit: u64,

    /// Retry policy for transport calls and unprocessed batch items
    pub retry: RetryPolicy,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_page_size: MAX_PAGE_SIZE,
            max_batch_size: MAX_BATCH_SIZE,
            max_limit: MAX_LIMIT,
            retry: RetryPolicy::default(),
        }
    }
}

impl QueryConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_max_limit(mut self, limit: u64) -> Self {
        self.max_limit = limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.max_page_size == 0 {
            return Err("max_page_size must be greater than 0".to_string());
        }

        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_SIZE {
            return Err(format!(
                "max_batch_size must be between 1 and {}",
                MAX_BATCH_SIZE
            ));
        }

        if self.max_limit == 0 {
            return Err("max_limit must be greater than 0".to_string());
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err("retry backoff_multiplier must be at least 1.0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueryConfig::default();
        assert_eq!(config.max_page_size, 1000);
        assert_eq!(config.max_batch_size, 25);
        assert_eq!(config.max_limit, 10_000_000_000);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_builder_methods() {
        let config = QueryConfig::new()
            .with_max_page_size(10)
            .with_max_batch_size(5)
            .with_max_limit(100)
            .with_retry(RetryPolicy::no_retry());

        assert_eq!(config.max_page_size, 10);
        assert_eq!(config.max_batch_size, 5);
        assert_eq!(config.max_limit, 100);
        assert_eq!(config.retry.max_attempts, 0);
    }

    #[test]
    fn test_validate_success() {
        assert!(QueryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_batch_size_bounds() {
        assert!(QueryConfig::new().with_max_batch_size(0).validate().is_err());
        assert!(QueryConfig::new().with_max_batch_size(26).validate().is_err());
    }

    #[test]
    fn test_validate_zero_page_size() {
        assert!(QueryConfig::new().with_max_page_size(0).validate().is_err());
    }
}
