//! Async utilities
//!
//! Bounded retry for database operations

use std::fmt::Display;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: usize,
    /// Fixed delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl RetryConfig {
    /// One attempt plus exactly one immediate retry
    pub fn single_retry() -> Self {
        Self {
            max_attempts: 2,
            delay_ms: 0,
        }
    }

    /// A single attempt with no retry
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay_ms: 0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::single_retry()
    }
}

/// Retry an async operation up to `config.max_attempts` times
pub async fn retry_async<F, Fut, T, E>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= max_attempts {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %err,
                        "Operation failed after all retry attempts"
                    );
                    return Err(err);
                }

                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %err,
                    "Operation failed, retrying"
                );

                if config.delay_ms > 0 {
                    sleep(Duration::from_millis(config.delay_ms)).await;
                }
            }
        }
    }
}
