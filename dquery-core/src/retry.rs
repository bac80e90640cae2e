use crate::error::THROTTLING_ERROR_CODES;
use crate::{Error, Record, Result};
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior with exponential backoff.
///
/// Defines how many times to retry a transport call, how long to wait
/// between attempts, and which transport error codes count as transient.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_attempts: u32,

    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,

    /// Multiplier applied to backoff after each retry
    pub backoff_multiplier: f64,

    /// Transport error codes that are retried
    pub retryable_codes: Vec<String>,
}

impl RetryPolicy {
    /// Creates a new retry policy that retries throttling errors.
    pub fn new(
        max_attempts: u32,
        initial_backoff_ms: u64,
        max_backoff_ms: u64,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
            max_backoff_ms,
            backoff_multiplier,
            retryable_codes: THROTTLING_ERROR_CODES.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Returns a policy with no retries.
    pub fn no_retry() -> Self {
        Self::new(0, 0, 0, 1.0)
    }

    /// Returns a policy for quick transient failures.
    pub fn fast() -> Self {
        Self::new(3, 10, 100, 2.0)
    }

    /// Returns a policy for longer-running retry scenarios.
    pub fn standard() -> Self {
        Self::new(5, 100, 5000, 2.0)
    }

    /// Replaces the set of retryable transport error codes.
    pub fn with_retryable_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Calculates the backoff duration for a given attempt number (0-indexed).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let backoff_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_backoff_ms as f64) as u64;
        Duration::from_millis(backoff_ms)
    }

    /// Whether this policy retries the given error.
    pub fn should_retry(&self, error: &Error) -> bool {
        match error {
            Error::Transport { code, .. } => self.retryable_codes.iter().any(|c| c == code),
            other => other.is_retryable(),
        }
    }
}

impl Default for RetryPolicy {
    /// Returns a sensible default retry policy (same as `standard()`).
    fn default() -> Self {
        Self::standard()
    }
}

/// Retries an operation according to the specified policy.
///
/// Only retries errors the policy accepts (see [`RetryPolicy::should_retry`]).
/// Uses exponential backoff between retry attempts.
///
/// # Examples
///
/// ```
/// use dquery_core::retry::{retry_with_policy, RetryPolicy};
/// use dquery_core::{Error, Result};
///
/// let mut calls = 0;
/// let result: Result<u32> = retry_with_policy(&RetryPolicy::new(3, 0, 0, 2.0), || {
///     calls += 1;
///     if calls < 2 {
///         Err(Error::transport("ThrottlingException", "slow down"))
///     } else {
///         Ok(calls)
///     }
/// });
/// assert_eq!(result.unwrap(), 2);
/// ```
pub fn retry_with_policy<F, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_error = match operation() {
        Ok(result) => return Ok(result),
        Err(e) if !policy.should_retry(&e) => return Err(e),
        Err(e) => e,
    };

    for attempt in 0..policy.max_attempts {
        let backoff = policy.backoff_duration(attempt);
        warn!(
            error = %last_error,
            remaining = policy.max_attempts - attempt,
            backoff_ms = backoff.as_millis() as u64,
            "Retrying after transient error"
        );
        std::thread::sleep(backoff);

        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !policy.should_retry(&e) => return Err(e),
            Err(e) => last_error = e,
        }
    }

    Err(last_error)
}

/// Retries an operation with the default policy.
pub fn retry<F, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    retry_with_policy(&RetryPolicy::default(), operation)
}

/// Like [`retry_with_policy`] but yields `fallback` once the retry budget
/// is spent. Errors the policy does not retry still propagate.
pub fn retry_with_fallback<F, T>(policy: &RetryPolicy, fallback: T, operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    match retry_with_policy(policy, operation) {
        Err(e) if policy.should_retry(&e) => Ok(fallback),
        other => other,
    }
}

/// Result of one batch call: the items the provider left unprocessed and
/// the raw response, kept for error reporting.
#[derive(Debug, Clone)]
pub struct BatchOutcome<T> {
    pub unprocessed: Vec<T>,
    pub response: serde_json::Value,
}

impl<T> BatchOutcome<T> {
    pub fn complete(response: serde_json::Value) -> Self {
        Self {
            unprocessed: Vec::new(),
            response,
        }
    }
}

/// Sends `items` and re-drives only the unprocessed subset of each response.
///
/// Once the policy's attempts are used up, fails with
/// [`Error::UnprocessedItems`] carrying what is left and the last response.
pub fn retry_unprocessed<T, F>(policy: &RetryPolicy, items: Vec<T>, mut operation: F) -> Result<()>
where
    T: Into<Record>,
    F: FnMut(Vec<T>) -> Result<BatchOutcome<T>>,
{
    let mut outcome = operation(items)?;

    for attempt in 0..policy.max_attempts {
        if outcome.unprocessed.is_empty() {
            return Ok(());
        }
        let backoff = policy.backoff_duration(attempt);
        warn!(
            unprocessed = outcome.unprocessed.len(),
            remaining = policy.max_attempts - attempt,
            backoff_ms = backoff.as_millis() as u64,
            "Re-sending unprocessed batch items"
        );
        std::thread::sleep(backoff);
        outcome = operation(outcome.unprocessed)?;
    }

    if outcome.unprocessed.is_empty() {
        return Ok(());
    }
    Err(Error::UnprocessedItems {
        items: outcome.unprocessed.into_iter().map(Into::into).collect(),
        response: outcome.response,
    })
}
