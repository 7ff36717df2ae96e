//! Retry policy for failed transfers.
//!
//! Implements exponential backoff with configurable parameters.

use crate::config::QueueSettings;
use crate::content_source::SourceError;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// A failed record is re-queued while its retry count stays below this.
    pub max_retries: i32,
    /// Backoff before the first automatic retry, in seconds.
    pub initial_backoff_secs: u64,
    /// Cap for exponential growth, in seconds.
    pub max_backoff_secs: u64,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(config: &QueueSettings) -> Self {
        Self {
            max_retries: i32::try_from(config.max_retries).unwrap_or(i32::MAX),
            initial_backoff_secs: config.initial_backoff_secs,
            max_backoff_secs: config.max_backoff_secs,
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Whether a record that just failed with `error` should be re-queued.
    ///
    /// `retry_count` is the count after the failure has been recorded.
    pub fn should_retry(&self, error: &SourceError, retry_count: i32) -> bool {
        error.is_retryable() && retry_count < self.max_retries
    }

    /// Backoff in seconds before retry number `retry_count` (1-based).
    ///
    /// `initial_backoff * multiplier^(retry_count - 1)`, capped at `max_backoff_secs`.
    pub fn backoff_secs(&self, retry_count: i32) -> u64 {
        let exponent = (retry_count - 1).max(0);
        let backoff = self.initial_backoff_secs as f64 * self.backoff_multiplier.powi(exponent);
        backoff.min(self.max_backoff_secs as f64) as u64
    }

    /// Unix millis at which retry number `retry_count` becomes eligible.
    pub fn next_attempt_at(&self, now_millis: i64, retry_count: i32) -> i64 {
        let backoff_millis = i64::try_from(self.backoff_secs(retry_count))
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        now_millis.saturating_add(backoff_millis)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&QueueSettings::default())
    }
}
