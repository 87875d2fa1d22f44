//! Retry policy and executor

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy for transient failures.
///
/// Attempt `k` (1-indexed) waits `min(backoff_base * 2^(k-1), backoff_max)`
/// seconds before the next try. Field names match the feed catalog YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,

    /// Base backoff in seconds for the exponential schedule
    pub backoff_base: f64,

    /// Ceiling on any single backoff wait, in seconds
    pub backoff_max: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 1.0,
            backoff_max: 10.0,
        }
    }
}

impl RetryPolicy {
    /// Policy used for blob upload retries: 3 attempts, exponential to 10 s.
    pub fn upload() -> Self {
        Self::default()
    }

    /// Check the policy against its permitted ranges.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=10).contains(&self.max_attempts) {
            return Err(format!(
                "max_attempts must be in [1, 10], got {}",
                self.max_attempts
            ));
        }
        if !(0.1..=10.0).contains(&self.backoff_base) {
            return Err(format!(
                "backoff_base must be in [0.1, 10.0], got {}",
                self.backoff_base
            ));
        }
        if !(1.0..=60.0).contains(&self.backoff_max) {
            return Err(format!(
                "backoff_max must be in [1.0, 60.0], got {}",
                self.backoff_max
            ));
        }
        Ok(())
    }

    /// Backoff to wait after a failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = self.backoff_base * 2f64.powi(attempt as i32 - 1);
        Duration::from_secs_f64(exp.min(self.backoff_max))
    }
}

/// Trait for errors that can be retried
pub trait Retryable {
    /// Whether this error is worth another attempt
    fn is_retryable(&self) -> bool;
}

/// Retry error types
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// All attempts failed with retryable errors
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// A terminal error ended the loop early
    #[error("{0}")]
    NonRetryable(E),
}

impl<E> RetryError<E> {
    /// Unwrap to the underlying error, dropping attempt bookkeeping.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::NonRetryable(error) => error,
        }
    }
}

/// Applies a [`RetryPolicy`] to an async operation.
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `f` until it succeeds, a non-retryable error occurs, or the
    /// policy's attempts are exhausted. The last error propagates.
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 1;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        return Err(RetryError::NonRetryable(error));
                    }
                    if attempt >= self.policy.max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, %error, "attempt failed, retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (retryable: {})", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[test]
    fn test_exponential_delays_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            backoff_base: 0.5,
            backoff_max: 3.0,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs_f64(0.5));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs_f64(1.0));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs_f64(2.0));
        // 0.5 * 2^3 = 4.0 exceeds the cap
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs_f64(3.0));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs_f64(3.0));
    }

    #[test]
    fn test_policy_validation_ranges() {
        assert!(RetryPolicy::default().validate().is_ok());

        let too_many = RetryPolicy {
            max_attempts: 11,
            ..RetryPolicy::default()
        };
        assert!(too_many.validate().is_err());

        let tiny_base = RetryPolicy {
            backoff_base: 0.01,
            ..RetryPolicy::default()
        };
        assert!(tiny_base.validate().is_err());

        let huge_max = RetryPolicy {
            backoff_max: 120.0,
            ..RetryPolicy::default()
        };
        assert!(huge_max.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 3,
            backoff_base: 0.1,
            backoff_max: 1.0,
        });

        let result = executor
            .execute(|| {
                let count = counter_clone.fetch_add(1, Ordering::Relaxed);
                async move {
                    if count < 2 {
                        Err(TestError { retryable: true })
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_propagates_last_error() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 2,
            backoff_base: 0.1,
            backoff_max: 1.0,
        });

        let result: Result<(), _> = executor
            .execute(|| async { Err(TestError { retryable: true }) })
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_short_circuits() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(RetryPolicy::default());

        let result: Result<(), _> = executor
            .execute(|| {
                counter_clone.fetch_add(1, Ordering::Relaxed);
                async { Err(TestError { retryable: false }) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::NonRetryable(_))));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
