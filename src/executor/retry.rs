//! Bounded retry with exponential backoff

use crate::config::RetryConfig;
use crate::error::{AppError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fraction of the base delay added as random jitter, at most
const MAX_JITTER: f64 = 0.25;

/// Retry settings for one operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt following failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1u32 << exp)
    }

    fn delay(&self, attempt: u32, error: &AppError) -> Duration {
        let mut delay = self.backoff(attempt);
        if self.jitter && !delay.is_zero() {
            let fraction = rand::thread_rng().gen_range(0.0..=MAX_JITTER);
            delay += delay.mul_f64(fraction);
        }
        match error.retry_after() {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }
}

/// Runs an operation until it succeeds, fails permanently or runs out of attempts
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op`, passing the 1-based attempt number.
    ///
    /// Permanent errors are returned as-is. Transient errors are retried until
    /// `max_attempts`, after which they come back wrapped in
    /// `RetriesExhausted`. The operation must be idempotent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(error);
            }

            if attempt >= max_attempts {
                return Err(AppError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            let delay = self.policy.delay(attempt, &error);
            warn!(
                "{} failed (attempt {}/{}): {}; retrying in {}ms",
                label,
                attempt,
                max_attempts,
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
