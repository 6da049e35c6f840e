//! Retry executor for venue REST calls
//!
//! The executor is venue-agnostic: it consults only
//! `ExchangeError::is_transient()` and applies linear backoff between
//! attempts. Non-transient errors propagate on the first occurrence.

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryExecutor {
    /// `max_attempts` is the total attempt count including the first try.
    /// A value of 0 is treated as 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Run `op` until it succeeds, fails non-transiently, or the attempt
    /// budget is spent. The last error is returned unchanged.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut op: F) -> ExchangeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ExchangeResult<T>>,
    {
        let mut last_err: Option<ExchangeError> = None;

        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    tracing::warn!(
                        operation = %operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "transient failure, will retry"
                    );
                    last_err = Some(err);
                    if attempt < self.max_attempts {
                        // Linear backoff: base_delay * attempt number
                        tokio::time::sleep(self.base_delay * attempt).await;
                    }
                }
                Err(err) => {
                    tracing::debug!(
                        operation = %operation,
                        attempt,
                        error = %err,
                        "non-retryable failure"
                    );
                    return Err(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            ExchangeError::TransientRequest(format!("{operation}: retry budget exhausted"))
        }))
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let exec = RetryExecutor::new(3, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result: ExchangeResult<u32> = exec
            .execute("op", move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::Relaxed);
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_retried_then_succeed() {
        let exec = RetryExecutor::new(3, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result: ExchangeResult<&str> = exec
            .execute("op", move || {
                let c = Arc::clone(&c);
                async move {
                    if c.fetch_add(1, Ordering::Relaxed) < 2 {
                        Err(ExchangeError::Connection("refused".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_non_transient_fails_immediately() {
        let exec = RetryExecutor::new(5, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result: ExchangeResult<()> = exec
            .execute("op", move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::Relaxed);
                    Err(ExchangeError::Request("bad params".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(ExchangeError::Request(_))));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted_returns_last_error() {
        let exec = RetryExecutor::new(2, Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result: ExchangeResult<()> = exec
            .execute("op", move || {
                let c = Arc::clone(&c);
                async move {
                    let n = c.fetch_add(1, Ordering::Relaxed);
                    Err(ExchangeError::RateLimited(format!("attempt {n}")))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::Relaxed), 2);
        match result {
            Err(ExchangeError::RateLimited(msg)) => assert_eq!(msg, "attempt 1"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
