//! Bounded retry for fallible cluster operations
//!
//! Every administrative command issued by this crate is either idempotent or
//! reports "already done", so re-sending after a transient failure is safe.
//! The policy is deliberately flat: a fixed number of retries with a fixed
//! delay, after which the last failure goes back to the caller.

use crate::classify::{ServerErrorClass, classify_server_error};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(1500),
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Total number of attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Execute `operation` under the default retryability rules
pub async fn retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    retry_if(config, is_retryable, operation).await
}

/// Execute `operation`, retrying failures accepted by `should_retry`
pub async fn retry_if<F, Fut, T, P>(config: &RetryConfig, should_retry: P, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if !should_retry(&error) || attempt >= config.max_attempts() {
                    return Err(error);
                }

                tracing::debug!(
                    "attempt {}/{} failed: {}; retrying in {:?}",
                    attempt,
                    config.max_attempts(),
                    error,
                    config.delay
                );
                sleep(config.delay).await;
            }
        }
    }
}

/// Check if an error is worth another attempt
pub fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Connection(_) | Error::Transport(_) => true,
        Error::Server { message, .. } => {
            classify_server_error(message) == ServerErrorClass::Transient
        }
        _ => false,
    }
}
