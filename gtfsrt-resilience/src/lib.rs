//! Resilience primitives shared by the archiver and compactor.
//!
//! Retry is expressed as a plain policy value applied by an executor loop;
//! the loop owns all logging so callers and wrapped closures stay free of
//! observability side effects.

pub mod retry;
pub mod shutdown;

pub use retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};
pub use shutdown::ShutdownCoordinator;
