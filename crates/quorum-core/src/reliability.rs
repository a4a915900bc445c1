//! Retry policy applied at collaborator boundaries.
//!
//! The key service client wraps every call in `RetryPolicy::execute_if`,
//! retrying only transient failures. The pause between attempts is delegated
//! to the caller's `wait` so a shutdown can interrupt an otherwise unbounded
//! retry.

use std::future::Future;
use std::time::Duration;

/// Unbounded retry with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause before every retry
    pub delay: Duration,
}

impl RetryPolicy {
    /// Fixed delay, never gives up
    pub fn unbounded_fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// Execute an async operation, retrying errors accepted by `retryable`.
    ///
    /// Other errors are returned immediately. Between attempts `wait` is
    /// awaited with the policy's delay; an error from it ends the retry and
    /// is returned as is.
    pub async fn execute_if<F, Fut, T, E, P, W, WFut>(
        &self,
        mut operation: F,
        retryable: P,
        mut wait: W,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        W: FnMut(Duration) -> WFut,
        WFut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) if retryable(&err) => {
                    tracing::warn!(attempt, delay = ?self.delay, error = %err, "retrying after transient failure");
                    wait(self.delay).await?;
                    attempt = attempt.saturating_add(1);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    async fn sleep(delay: Duration) -> Result<(), String> {
        tokio::time::sleep(delay).await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_retry_eventually_succeeds() {
        let calls = Cell::new(0u32);
        let policy = RetryPolicy::unbounded_fixed(Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        let result: Result<u32, String> = policy
            .execute_if(
                || {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move {
                        if n < 25 {
                            Err("unreachable".to_string())
                        } else {
                            Ok(n)
                        }
                    }
                },
                |_| true,
                sleep,
            )
            .await;
        assert_eq!(result, Ok(25));
        assert_eq!(start.elapsed(), Duration::from_secs(24));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = Cell::new(0u32);
        let policy = RetryPolicy::unbounded_fixed(Duration::from_secs(1));
        let result: Result<(), String> = policy
            .execute_if(
                || {
                    calls.set(calls.get() + 1);
                    async { Err("fatal".to_string()) }
                },
                |err: &String| err != "fatal",
                sleep,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_wait_ends_retry() {
        let calls = Cell::new(0u32);
        let policy = RetryPolicy::unbounded_fixed(Duration::from_secs(1));
        let result: Result<(), String> = policy
            .execute_if(
                || {
                    calls.set(calls.get() + 1);
                    async { Err("down".to_string()) }
                },
                |_| true,
                |_| async { Err("cancelled".to_string()) },
            )
            .await;
        assert_eq!(result, Err("cancelled".to_string()));
        assert_eq!(calls.get(), 1);
    }
}
