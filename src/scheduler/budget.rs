//! Wall-clock budget accounting for one cycle

use crate::config::SchedulingConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Sizing knobs for a batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchLimits {
    pub per_item_estimate: Duration,
    pub per_item_timeout: Duration,
    pub max_batch_size: usize,
    pub max_concurrency: usize,
}

impl From<&SchedulingConfig> for BatchLimits {
    fn from(config: &SchedulingConfig) -> Self {
        Self {
            per_item_estimate: config.per_item_estimate(),
            per_item_timeout: config.per_item_timeout(),
            max_batch_size: config.max_batch_size,
            max_concurrency: config.max_concurrency,
        }
    }
}

/// How many entities may be dispatched with `remaining` time left.
///
/// Starts from `remaining / per_item_estimate` clamped to `[1, max_batch_size]`,
/// then shrinks until the batch's worst case (every wave running into its
/// timeout) fits in `remaining`. Zero means stop.
pub fn plan_batch(remaining: Duration, limits: &BatchLimits) -> usize {
    if remaining.is_zero() {
        return 0;
    }

    let estimate = limits.per_item_estimate.as_millis().max(1);
    let by_estimate = (remaining.as_millis() / estimate)
        .clamp(1, limits.max_batch_size.max(1) as u128) as usize;

    let timeout = limits.per_item_timeout.as_millis().max(1);
    let waves = (remaining.as_millis() / timeout) as usize;
    let by_timeout = waves.saturating_mul(limits.max_concurrency.max(1));

    by_estimate.min(by_timeout)
}

/// Tracks elapsed and charged time against a fixed budget
#[derive(Debug)]
pub struct BudgetTracker {
    started: Instant,
    budget: Duration,
    safety_margin: Duration,
    charged: Duration,
}

impl BudgetTracker {
    /// Start the clock now
    pub fn start(budget: Duration, safety_margin: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
            safety_margin,
            charged: Duration::ZERO,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn charged(&self) -> Duration {
        self.charged
    }

    /// Time still available; consumption is the larger of real and charged time
    pub fn remaining(&self) -> Duration {
        let consumed = self.elapsed().max(self.charged);
        self.budget
            .saturating_sub(self.safety_margin)
            .saturating_sub(consumed)
    }

    /// Charge `items` dispatched entities at `per_item` each
    pub fn charge(&mut self, items: usize, per_item: Duration) {
        self.charged = self
            .charged
            .saturating_add(per_item.saturating_mul(items as u32));
    }

    /// Size of the next batch, zero when the cycle must stop
    pub fn next_batch_size(&self, limits: &BatchLimits) -> usize {
        plan_batch(self.remaining(), limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(estimate_ms: u64, timeout_ms: u64, max_batch: usize, concurrency: usize) -> BatchLimits {
        BatchLimits {
            per_item_estimate: Duration::from_millis(estimate_ms),
            per_item_timeout: Duration::from_millis(timeout_ms),
            max_batch_size: max_batch,
            max_concurrency: concurrency,
        }
    }

    #[test]
    fn test_batch_from_estimate() {
        let l = limits(2_000, 8_000, 25, 5);
        assert_eq!(plan_batch(Duration::from_millis(10_000), &l), 5);
    }

    #[test]
    fn test_batch_clamped_to_max() {
        let l = limits(100, 1_000, 25, 50);
        assert_eq!(plan_batch(Duration::from_secs(60), &l), 25);
    }

    #[test]
    fn test_batch_at_least_one_when_timeout_fits() {
        let l = limits(5_000, 1_000, 25, 1);
        assert_eq!(plan_batch(Duration::from_millis(2_000), &l), 1);
    }

    #[test]
    fn test_batch_shrinks_to_timeout_waves() {
        // Estimate allows 10, but only one wave of 3 can time out in 10s
        let l = limits(1_000, 8_000, 25, 3);
        assert_eq!(plan_batch(Duration::from_millis(10_000), &l), 3);
    }

    #[test]
    fn test_no_batch_when_a_timeout_does_not_fit() {
        let l = limits(2_000, 8_000, 25, 5);
        assert_eq!(plan_batch(Duration::from_millis(6_000), &l), 0);
        assert_eq!(plan_batch(Duration::ZERO, &l), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_uses_larger_of_elapsed_and_charged() {
        let mut tracker = BudgetTracker::start(Duration::from_millis(10_000), Duration::from_millis(1_000));
        assert_eq!(tracker.remaining(), Duration::from_millis(9_000));

        tracker.charge(2, Duration::from_millis(2_000));
        assert_eq!(tracker.remaining(), Duration::from_millis(5_000));

        tokio::time::advance(Duration::from_millis(7_000)).await;
        assert_eq!(tracker.remaining(), Duration::from_millis(2_000));

        tokio::time::advance(Duration::from_millis(5_000)).await;
        assert_eq!(tracker.remaining(), Duration::ZERO);
        assert_eq!(tracker.next_batch_size(&limits(1, 1, 5, 5)), 0);
    }
}
