//! Bounded retry for operations that fail transiently

use std::future::Future;
use std::time::Duration;

use bndl_errors::Transient;

/// How often and how patiently to re-attempt a transiently failing
/// operation.
///
/// `attempts` counts re-attempts, so an operation runs at most
/// `attempts + 1` times. `RetryPolicy::none()` runs it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub wait: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(attempts: u32, wait: Duration) -> Self {
        Self { attempts, wait }
    }

    /// Single attempt, no waiting.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            attempts: 0,
            wait: Duration::ZERO,
        }
    }

    /// Total number of times the operation may run.
    #[must_use]
    pub const fn max_runs(self) -> u32 {
        self.attempts + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            wait: Duration::from_millis(250),
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy is
/// exhausted.
///
/// Only errors whose [`Transient`] classification says waiting may help
/// are retried; all others surface immediately. After the final attempt
/// the last transient error is returned unchanged.
///
/// # Errors
///
/// Returns the first permanent error or the last transient one.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Transient,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    for attempt in 0..policy.attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                tracing::debug!(attempt = attempt + 1, "transient failure, retrying");
                tokio::time::sleep(policy.wait).await;
            }
            Err(err) => return Err(err),
        }
    }
    op().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct TestError {
        transient: bool,
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    #[tokio::test]
    async fn transient_failures_run_attempts_plus_one_times() {
        let runs = AtomicU32::new(0);
        let result: Result<(), TestError> = retry(RetryPolicy::new(3, Duration::from_millis(1)), || {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { transient: true }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_failure_stops_immediately() {
        let runs = AtomicU32::new(0);
        let result: Result<(), TestError> = retry(RetryPolicy::new(5, Duration::from_millis(1)), || {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { transient: false }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_after_transient_failures() {
        let runs = AtomicU32::new(0);
        let result = retry(RetryPolicy::new(3, Duration::from_millis(1)), || {
            let run = runs.fetch_add(1, Ordering::SeqCst);
            async move {
                if run < 2 {
                    Err(TestError { transient: true })
                } else {
                    Ok(run)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn none_policy_runs_exactly_once() {
        let runs = AtomicU32::new(0);
        let result: Result<(), TestError> = retry(RetryPolicy::none(), || {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { transient: true }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(RetryPolicy::none().max_runs(), 1);
    }
}
