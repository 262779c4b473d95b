//! Execution primitives: retry, deadline, bounded concurrency

pub mod concurrency;
pub mod retry;
pub mod timeout;

pub use concurrency::ConcurrencyManager;
pub use retry::{RetryExecutor, RetryPolicy};
pub use timeout::TimeoutExecutor;
