//! Bounded retry with exponential backoff for external service calls
//!
//! Applied uniformly to extraction, description and image calls. Only errors
//! that report themselves transient are retried.

use menugen_common::config::PipelineConfig;
use std::future::Future;
use std::time::Duration;

/// Errors that can say whether a retry might succeed
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

/// Attempt budget and backoff curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (>= 1)
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Policy for calls to the vision/text/image services
    pub fn for_services(config: &PipelineConfig) -> Self {
        Self::new(
            config.service_retry_attempts,
            Duration::from_millis(config.service_retry_initial_ms),
            Duration::from_millis(config.service_retry_max_ms),
        )
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1
    ///
    /// Doubles from `initial_backoff`, capped at `max_backoff`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the budget is spent
pub async fn retry_transient<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient service error, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if attempt > 1 {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Service call failed after retries"
                    );
                }
                return Err(err);
            }
        }
    }
}
