//! Per-task deadlines with cooperative cancellation

use crate::error::{AppError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Races an operation against a deadline.
///
/// The operation receives a `CancellationToken` that is cancelled when the
/// deadline fires; the operation's future is dropped at that point, so any
/// work past its last `.await` never runs. A timeout is an unknown outcome
/// and callers must treat it as retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutExecutor {
    deadline: Duration,
}

impl TimeoutExecutor {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = CancellationToken::new();
        let fut = op(token.clone());

        tokio::select! {
            biased;
            result = fut => result,
            _ = tokio::time::sleep(self.deadline) => {
                token.cancel();
                Err(AppError::Timeout {
                    after_ms: self.deadline.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fast_operation_completes() {
        let result = TimeoutExecutor::new(Duration::from_secs(1))
            .run(|_| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(5)
            })
            .await;
        assert_eq!(result.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_times_out_and_is_cancelled() {
        let token_seen = Arc::new(parking_lot::Mutex::new(None::<CancellationToken>));
        let finished = Arc::new(AtomicBool::new(false));

        let result: Result<()> = TimeoutExecutor::new(Duration::from_millis(100))
            .run(|token| {
                *token_seen.lock() = Some(token);
                let finished = finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    finished.store(true, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::Timeout { after_ms: 100 })));
        assert!(result.unwrap_err().is_retryable());
        assert!(token_seen.lock().as_ref().unwrap().is_cancelled());

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_error_passes_through() {
        let result: Result<()> = TimeoutExecutor::new(Duration::from_secs(1))
            .run(|_| async { Err(AppError::Validation("bad".into())) })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
