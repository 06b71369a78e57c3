//! Bounded linear-backoff retry combinator.
//!
//! Connection establishment (HTTP reachability probe, WebSocket
//! connect) retries with a fixed delay under an explicit attempt
//! budget.  The policy object replaces ad-hoc retry-with-sleep loops;
//! the total wait is bounded by `attempts * (delay + per-attempt
//! timeout)` and a [`CancellationToken`] can abort mid-budget.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Tunable parameters for one retry budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts. Zero is treated as one.
    pub attempts: u32,
    /// Fixed delay between attempts (linear backoff).
    pub delay: Duration,
    /// Timeout applied to each individual attempt by the consumer
    /// (e.g. as a per-request timeout); the combinator itself does not
    /// enforce it.
    pub per_attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            per_attempt_timeout: None,
        }
    }

    pub fn with_per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = Some(timeout);
        self
    }
}

/// Outcome of an exhausted or aborted retry budget.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the final attempt's error.
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// The cancellation token was triggered before success.
    #[error("retry cancelled")]
    Cancelled,
}

/// Run `op` until it succeeds or the attempt budget is exhausted.
///
/// Waits `policy.delay` between attempts.  Cancellation is honored
/// both while an attempt is in flight and during the inter-attempt
/// delay.
pub async fn retry_until<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        attempt += 1;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = op() => match result {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    return Err(RetryError::Exhausted { attempts, last: e });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        budget = attempts,
                        error = %e,
                        "Attempt failed, retrying",
                    );
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<String>> =
            retry_until(&fast_policy(5), &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, RetryError<String>> =
            retry_until(&fast_policy(5), &CancellationToken::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count_and_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<String>> =
            retry_until(&fast_policy(3), &CancellationToken::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure {n}")) }
            })
            .await;
        assert_matches!(
            result,
            Err(RetryError::Exhausted { attempts: 3, last }) if last == "failure 2"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<String>> =
            retry_until(&fast_policy(0), &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope".to_string()) }
            })
            .await;
        assert_matches!(result, Err(RetryError::Exhausted { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_token_makes_no_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<String>> =
            retry_until(&fast_policy(5), &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope".to_string()) }
            })
            .await;
        assert_matches!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
