//! Bounded-concurrency batch execution

use crate::error::{AppError, Result};
use futures_util::stream::{self, StreamExt};
use std::future::Future;

/// Runs a batch of independent tasks with at most `max_concurrency` in flight.
///
/// Tasks are polled as one stream on the caller's task; nothing is spawned.
/// One task failing never cancels the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyManager {
    max_concurrency: usize,
}

impl ConcurrencyManager {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Results come back in the same order as `items`
    pub async fn execute_batch<I, T, F, Fut>(&self, items: Vec<I>, f: F) -> Vec<Result<T>>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let len = items.len();
        let mut slots: Vec<Option<Result<T>>> = (0..len).map(|_| None).collect();

        let mut completions = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| {
                let task = f(item);
                async move { (index, task.await) }
            })
            .buffer_unordered(self.max_concurrency);

        while let Some((index, result)) = completions.next().await {
            slots[index] = Some(result);
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(AppError::Internal("task produced no result".into())))
            })
            .collect()
    }
}
