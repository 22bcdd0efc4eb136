//! Retry with exponential backoff around fallible, idempotent operations.

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

/// Attempt count and backoff curve for [`retry_with_backoff`].
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first. Never less than 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for BackoffPolicy {
    /// 3 attempts, waiting 2s then 4s (capped at 10s).
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            multiplier: 2,
        }
    }
}

impl BackoffPolicy {
    /// A single retry waiting between 2s and 5s, for live-link probes.
    pub fn probe() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
            multiplier: 2,
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before attempt `attempt` (1-indexed; the first attempt never
    /// waits).
    ///
    /// - Attempt 2: `initial_delay`
    /// - Attempt n: `initial_delay * multiplier^(n-2)`, capped by `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.saturating_pow(attempt - 2);
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }
}

/// Runs `operation` until it succeeds, returns a non-retryable error, or the
/// policy's attempts are exhausted. The last error is returned.
///
/// Only errors for which [`AppError::is_retryable`] holds are retried.
/// Parse, configuration and store errors end the loop on the first attempt,
/// since repeating the same input fails the same way.
///
/// `operation` receives the 1-indexed attempt number.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, AppError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && error.is_retryable() => {
                let delay = policy.delay_for_attempt(attempt + 1);
                tracing::warn!(
                    %label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                tracing::debug!(%label, attempt, %error, "Giving up");
                return Err(error);
            }
        }
    }
}
