use std::{fmt::Display, future::Future, time::Duration};

use tracing::{info, warn};

use crate::error::StoreError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Errors that may succeed when the same request is issued again.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// Single attempt, no backoff.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay slept after the `failed_attempt`-th failure (1-based).
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1);
        let factor = 2u32.saturating_pow(exponent);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. The error of the last attempt is returned.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, op: F) -> Result<T, E>
    where
        E: Transient + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_if(operation, E::is_transient, op).await
    }

    /// Like [`run`](Self::run), with `retryable` deciding which failures
    /// earn another attempt.
    pub async fn run_if<T, E, F, Fut, P>(
        &self,
        operation: &str,
        retryable: P,
        mut op: F,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation, attempt, "record store request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if retryable(&err) && attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "record store request failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        retryable = retryable(&err),
                        error = %err,
                        "record store request failed; giving up"
                    );
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use tokio::time::Instant;

    use super::*;

    fn server_error(attempt: u32) -> StoreError {
        StoreError::Api {
            status: 503,
            message: format!("unavailable #{attempt}"),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(700),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(700));
        assert_eq!(policy.delay_after(40), Duration::from_millis(700));
    }

    #[test]
    fn classifies_transient_errors() {
        assert!(StoreError::Timeout.is_transient());
        assert!(StoreError::Transport("reset".into()).is_transient());
        assert!(server_error(1).is_transient());
        assert!(StoreError::Api {
            status: 429,
            message: "slow down".into()
        }
        .is_transient());
        assert!(!StoreError::Api {
            status: 422,
            message: "bad field".into()
        }
        .is_transient());
        assert!(!StoreError::Decode("eof".into()).is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_error_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        let started = Instant::now();

        let result: Result<(), StoreError> = policy
            .run("update_record", || {
                let calls = calls.clone();
                async move {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(server_error(attempt))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result, Err(server_error(3)));
        // 500ms + 1000ms of backoff between the three attempts.
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let value = policy
            .run("find_record", || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StoreError::Timeout)
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .expect("second attempt succeeds");

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let err = policy
            .run("create_record", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(StoreError::Api {
                        status: 422,
                        message: "Unknown field name: \"Colour\"".into(),
                    })
                }
            })
            .await
            .expect_err("must fail");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.status(), Some(422));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_predicate_limits_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let err = policy
            .run_if("create_record", StoreError::is_retryable_response, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(StoreError::Timeout)
                }
            })
            .await
            .expect_err("must fail");
        assert_eq!(err, StoreError::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = Arc::new(AtomicU32::new(0));
        let _ = policy
            .run_if("create_record", StoreError::is_retryable_response, || {
                let calls = calls.clone();
                async move {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err::<(), _>(server_error(attempt))
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let _ = policy
            .run("list_records", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(StoreError::Timeout)
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
