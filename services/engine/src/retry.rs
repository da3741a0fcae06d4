//! Bounded retry policy for transient upstream failures
//!
//! Two consumers: the round engine retries phase writes against Redis
//! and the chain reader retries receipt lookups. Both cap the number of
//! attempts and back off exponentially; anything that is not a
//! transient upstream failure surfaces immediately.

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use shared::errors::EngineError;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(15))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(120)))
            .build()
    }

    /// Whether another attempt is allowed after `failures` failed ones.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}

/// Only `Upstream` failures are worth repeating; every other category
/// is a final answer or a bug.
pub fn is_transient(error: &EngineError) -> bool {
    matches!(error, EngineError::Upstream(_))
}

/// Transport-level classification for receipt lookups: timeouts,
/// connect failures, and 5xx/429 responses are retried; a 4xx or a
/// malformed body will not improve on a second attempt.
pub fn is_transient_http(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }
    matches!(
        error.status(),
        Some(status) if status.is_server_error()
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
    )
}
