//! Bounded retry with exponential backoff around ad platform calls.

use std::future::Future;
use std::time::Duration;

use campaign_core::config::RetryConfig;
use campaign_core::AdServiceError;
use tracing::{debug, warn};

/// Retry configuration with exponential backoff.
///
/// One policy serves both the create call and the status poll. Each attempt
/// is additionally bounded by `call_timeout`, which is unrelated to the
/// backoff between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single backoff.
    pub max_backoff: Duration,
    /// Backoff multiplier per attempt.
    pub backoff_multiplier: f64,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        }
    }

    /// Compute the backoff duration for a given attempt (0-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped_ms = base_ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Runs `call` until it succeeds, fails fatally, or the attempts run out.
    ///
    /// The error of the final attempt is returned unchanged so callers can
    /// classify it themselves.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, AdServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdServiceError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            metrics::counter!("ads.retry.attempts", "operation" => operation.to_string())
                .increment(1);

            let result = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(AdServiceError::Timeout(self.call_timeout.as_millis() as u64)),
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.retryable() {
                debug!(operation, attempt, error = %err, "non-retryable failure");
                return Err(err);
            }
            if attempt >= self.max_attempts {
                warn!(operation, attempts = attempt, error = %err, "retries exhausted");
                metrics::counter!("ads.retry.exhausted", "operation" => operation.to_string())
                    .increment(1);
                return Err(err);
            }

            let delay = self.backoff_for_attempt(attempt - 1);
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retryable failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
