//! Bounded retry with caller-supplied backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::Result;

/// How many times an operation is attempted and how long to wait between
/// attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Step of the linear backoff.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based): `attempt * base_delay`.
    pub fn linear_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Run `op` under this policy with linear backoff.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = *self;
        retry_with_backoff(op, self.max_attempts, move |attempt| {
            policy.linear_delay(attempt)
        })
        .await
    }
}

/// Run `op` up to `max_attempts` times.
///
/// `op` receives the 1-based attempt number. Only errors for which
/// [`ClientError::is_retryable`](crate::error::ClientError::is_retryable) holds trigger another attempt; anything
/// else is returned immediately. After a failed attempt `n` the combinator
/// sleeps for `backoff(n)`. The last error is returned once attempts run out.
pub async fn retry_with_backoff<T, F, Fut, B>(
    mut op: F,
    max_attempts: u32,
    backoff: B,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    B: Fn(u32) -> Duration,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!(attempt, error = %e, "Giving up");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use parley_store::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> ClientError {
        ClientError::Store(StoreError::Unavailable("flaky".into()))
    }

    #[test]
    fn test_linear_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(policy.linear_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.linear_delay(2), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = retry_with_backoff(
            move |_| {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok("done")
                    }
                }
            },
            3,
            |_| Duration::from_millis(1),
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<()> = retry_with_backoff(
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            },
            3,
            |_| Duration::from_millis(1),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<()> = retry_with_backoff(
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::InvalidInput("bad".into())) }
            },
            3,
            |_| Duration::from_millis(1),
        )
        .await;
        assert!(matches!(result, Err(ClientError::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_numbers_passed_to_op() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = seen.clone();
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let _: Result<()> = policy
            .run(move |attempt| {
                s.lock().unwrap().push(attempt);
                async { Err(transient()) }
            })
            .await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
