//! Per-provider request rate limiting
//!
//! Token bucket rate limiting so a batch of concurrent entity tasks never
//! exceeds a provider's request quota. Each provider gets its own bucket;
//! tasks wait for a token instead of being rejected.

use crate::error::{AppError, Result};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Token bucket rate limiter
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum tokens (requests) allowed per period
    capacity: u32,
    /// Current available tokens
    tokens: f64,
    /// Tokens added per second
    refill_rate: f64,
    /// Last refill time
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a new token bucket
    pub fn new(rate_per_second: u32) -> Self {
        let rate = rate_per_second.max(1);
        Self {
            capacity: rate,
            tokens: rate as f64,
            refill_rate: rate as f64,
            last_refill: Instant::now(),
        }
    }

    /// Update the rate limit
    pub fn update_rate(&mut self, rate_per_second: u32) {
        let rate = rate_per_second.max(1);
        self.capacity = rate;
        self.refill_rate = rate as f64;
        // Don't exceed new capacity
        if self.tokens > self.capacity as f64 {
            self.tokens = self.capacity as f64;
        }
    }

    /// Try to consume a token, returns true if allowed
    pub fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Get time until a token will be available
    pub fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Duration::from_secs_f64(tokens_needed / self.refill_rate)
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let refill_amount = elapsed.as_secs_f64() * self.refill_rate;

        self.tokens = (self.tokens + refill_amount).min(self.capacity as f64);
        self.last_refill = now;
    }
}

/// Shared limiter for one provider
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(rate_per_second: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(rate_per_second)),
        }
    }

    pub fn update_rate(&self, rate_per_second: u32) {
        self.bucket.lock().update_rate(rate_per_second);
    }

    pub fn try_acquire(&self) -> bool {
        self.bucket.lock().try_acquire()
    }

    /// Wait for a token, giving up when `cancel` fires
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock();
                if bucket.try_acquire() {
                    return Ok(());
                }
                bucket.time_until_available()
            };

            tracing::trace!("Rate limit reached, waiting {:?}ms", wait.as_millis());

            tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                _ = tokio::time::sleep(wait.max(Duration::from_millis(1))) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_basic() {
        let mut bucket = TokenBucket::new(10); // 10 per second

        // Should allow first 10 requests
        for _ in 0..10 {
            assert!(bucket.try_acquire());
        }

        // 11th should fail
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_refill() {
        let mut bucket = TokenBucket::new(100);

        // Drain all tokens
        for _ in 0..100 {
            bucket.try_acquire();
        }
        assert!(!bucket.try_acquire());

        tokio::time::advance(Duration::from_millis(100)).await;

        // Should have ~10 tokens now (100/s * 0.1s)
        for _ in 0..10 {
            assert!(bucket.try_acquire());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(2);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..4 {
            limiter.acquire(&cancel).await.unwrap();
        }

        // Two tokens up front, then one every 500ms
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_honours_cancellation() {
        let limiter = RateLimiter::new(1);
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        cancel.cancel();
        let result = limiter.acquire(&cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_rate_caps_tokens() {
        let limiter = RateLimiter::new(10);
        limiter.update_rate(1);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
