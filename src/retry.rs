//! Bounded exponential backoff around a single provider call.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::ai::AiError;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Retry 401/403 like transient failures.
    pub retry_auth_failures: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            retry_auth_failures: false,
        }
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// `min(base_delay * 2^attempt, max_delay)`, no jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether `error` is worth another attempt under this policy.
    pub fn should_retry(&self, error: &AiError) -> bool {
        match error {
            AiError::AuthError(_) => self.retry_auth_failures,
            AiError::Unsupported(_) => false,
            _ => true,
        }
    }

    /// Run `operation` until it succeeds or `max_retries + 1` attempts have
    /// failed, then return the last failure.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, AiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AiError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if attempt >= self.max_retries || !self.should_retry(&e) {
                        return Err(e);
                    }

                    let delay = self.delay_for_attempt(attempt);
                    log::warn!(
                        "Provider error (attempt {}/{}): {}, retrying in {:?}",
                        attempt + 1,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
