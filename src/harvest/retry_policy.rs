//! Retry policy for failed catalog calls.
//!
//! Implements exponential backoff with configurable parameters.

use std::time::Duration;

use crate::catalog::ApiError;
use crate::config::RetrySettings;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds (cap for exponential growth).
    pub max_backoff_ms: u64,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Create a new RetryPolicy from configuration settings.
    pub fn new(config: &RetrySettings) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Policy that never retries.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Check if an error should be retried given the number of retries done so far.
    ///
    /// Returns true if:
    /// - The error is retryable (transient, rate limited, garbled body)
    /// - The retry count is less than max_retries
    pub fn should_retry(&self, error: &ApiError, retry_count: u32) -> bool {
        error.is_retryable() && retry_count < self.max_retries
    }

    /// Backoff for a given retry count.
    ///
    /// Uses `initial_backoff * multiplier^retry_count`, capped at `max_backoff_ms`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let backoff = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(backoff.min(self.max_backoff_ms as f64) as u64)
    }

    /// Delay before the next attempt. A server-supplied `Retry-After` wins
    /// when it is longer than the computed backoff.
    pub fn delay_for(&self, error: &ApiError, retry_count: u32) -> Duration {
        let backoff = self.backoff(retry_count);
        match error.retry_after() {
            Some(requested) => requested.max(backoff),
            None => backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetrySettings::default())
    }
}
