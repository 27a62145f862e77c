//! Retry and timeout helpers for signaling and negotiation operations
//!
//! Operations against the SFU and the native peer connection can fail
//! transiently (a renegotiation in flight, a reconnecting socket). This module
//! provides a bounded-attempt retry loop with randomized delays and a
//! timeout race used across the stack.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::{InfraError, InfraResult};

/// Configuration for retry behavior
///
/// Every failed attempt waits for a delay drawn uniformly from
/// `min_delay..=max_delay` before the next one. `max_attempts` counts the
/// first attempt, so a policy with `max_attempts == 1` never retries.
///
/// # Examples
///
/// ```rust
/// # use vidcall_infra_common::retry::RetryPolicy;
/// # use std::time::Duration;
/// let fast = RetryPolicy::fast();
/// assert_eq!(fast.max_attempts, 3);
/// assert_eq!(fast.min_delay, Duration::from_millis(250));
/// assert_eq!(fast.max_delay, Duration::from_millis(500));
///
/// let custom = RetryPolicy::new(5, Duration::from_millis(10), Duration::from_millis(20));
/// assert_eq!(custom.max_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Lower bound of the randomized delay between attempts
    pub min_delay: Duration,
    /// Upper bound of the randomized delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fast()
    }
}

impl RetryPolicy {
    /// Create a policy with explicit bounds
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            min_delay,
            max_delay,
        }
    }

    /// Short, bounded retries for operations that usually recover quickly
    ///
    /// Used when adding remote ICE candidates and for most SFU RPCs.
    pub fn fast() -> Self {
        Self::new(3, Duration::from_millis(250), Duration::from_millis(500))
    }

    /// Long-running retries for requests that must eventually go through
    ///
    /// Used for subscription updates.
    pub fn persistent() -> Self {
        Self::new(30, Duration::from_millis(500), Duration::from_millis(2500))
    }

    /// A single attempt with no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Draw the delay to wait before the next attempt
    pub fn next_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Retry an async operation according to `policy`
///
/// Every error is considered retryable; the last error is returned once the
/// attempts are exhausted.
pub async fn retry_with_policy<T, E, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_while(operation_name, policy, || true, operation).await
}

/// Retry an async operation while `should_retry` keeps returning `true`
///
/// The precondition is evaluated after each failure; when it returns `false`
/// the loop stops and the failure is returned without waiting.
pub async fn retry_while<T, E, F, Fut, C>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut should_retry: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: FnMut() -> bool,
    E: Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) => {
                if attempt >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %error,
                        "Operation failed after all retry attempts"
                    );
                    return Err(error);
                }

                if !should_retry() {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %error,
                        "Retry precondition no longer holds"
                    );
                    return Err(error);
                }

                let delay = policy.next_delay();
                debug!(
                    operation = operation_name,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

/// Race `future` against a timer
///
/// Whichever finishes first wins; the loser is dropped.
pub async fn with_timeout<T, F>(operation_name: &str, timeout: Duration, future: F) -> InfraResult<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(value) => Ok(value),
        Err(_) => {
            warn!(
                operation = operation_name,
                timeout_ms = timeout.as_millis() as u64,
                "Operation timed out"
            );
            Err(InfraError::timeout(operation_name, timeout.as_millis() as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<u32, String> = retry_with_policy("flaky", &quick(3), || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(format!("attempt {}", n)) } else { Ok(n) }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_last_error_when_exhausted() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), String> = retry_with_policy("always-fails", &quick(3), || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("attempt {}", n))
            }
        })
        .await;

        assert_eq!(result, Err("attempt 3".to_string()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_when_precondition_fails() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), &str> = retry_while("detached", &quick(10), || false, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("boom")
            }
        })
        .await;

        assert_eq!(result, Err("boom"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let _: Result<(), &str> = retry_with_policy("zero", &quick(0), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("nope")
            }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_next_delay_within_bounds() {
        let policy = RetryPolicy::persistent();
        for _ in 0..100 {
            let delay = policy.next_delay();
            assert!(delay >= policy.min_delay && delay <= policy.max_delay);
        }
        assert_eq!(RetryPolicy::none().next_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_with_timeout() {
        let ok = with_timeout("fast", Duration::from_millis(100), async { 7 }).await;
        assert_eq!(ok, Ok(7));

        let timed_out = with_timeout(
            "slow",
            Duration::from_millis(10),
            sleep(Duration::from_millis(200)),
        )
        .await;
        assert_eq!(timed_out, Err(InfraError::timeout("slow", 10)));
    }
}
