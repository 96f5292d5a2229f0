use crate::interface::Retryable;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tokio_retry2::{Retry, RetryError};
use tracing::{error, warn};

/// Bounded exponential backoff for calls to external services.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: usize,
    /// Milliseconds per backoff unit; delays grow as 2, 4, 8... units.
    pub unit_ms: u64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: usize) -> Self {
        Self {
            retries,
            unit_ms: 1000,
            max_delay: Duration::from_secs(60),
        }
    }

    /// Retries without sleeping.
    #[cfg(test)]
    pub fn immediate(retries: usize) -> Self {
        Self {
            retries,
            unit_ms: 0,
            max_delay: Duration::ZERO,
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the policy runs
/// out of retries. The last error is returned.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    step: &'static str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let strategy = ExponentialBackoff::from_millis(2)
        .factor(policy.unit_ms)
        .max_delay(policy.max_delay)
        .map(jitter)
        .take(policy.retries);
    let attempts = policy.retries + 1;
    let mut attempt = 0usize;

    Retry::spawn(strategy, || {
        attempt += 1;
        let current = attempt;
        let fut = operation();
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() && current < attempts => {
                    warn!("{} attempt {}/{} failed, retrying: {}", step, current, attempts, e);
                    Err(RetryError::Transient {
                        err: e,
                        retry_after: None,
                    })
                }
                Err(e) => {
                    error!("{} failed after {} attempt(s): {}", step, current, e);
                    Err(RetryError::Permanent(e))
                }
            }
        }
    })
    .await
}
