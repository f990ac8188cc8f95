use std::future::Future;
use std::time::Duration;

use crate::error::{Result, StoreError};

/// Bounded exponential backoff for store calls.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Backoff {
    max_retries: u32,
    base_ms: u64,
}

impl Backoff {
    pub fn new(max_retries: u32, base_ms: u64) -> Self {
        Self {
            max_retries,
            base_ms,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_ms.saturating_mul(1 << attempt.min(16)))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. Errors carry the number of attempts made.
    pub async fn run<T, F, Fut>(
        &self,
        action: &str,
        key: &str,
        mut op: F,
    ) -> std::result::Result<T, (u32, StoreError)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => {
                    tracing::debug!(%key, attempt, "{action} succeeded");
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    tracing::warn!(%key, attempt, error = %e, "{action} failed, retrying");
                    tokio::time::sleep(self.delay(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err((attempt + 1, e)),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn reset() -> StoreError {
        StoreError::Io {
            path: "k".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
        }
    }

    #[test]
    fn test_delay_doubles() {
        let backoff = Backoff::new(3, 100);
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), _> = Backoff::new(2, 10)
            .run("delete", "k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(reset())
            })
            .await;
        let (attempts, _) = result.unwrap_err();
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), _> = Backoff::new(5, 1)
            .run("put", "k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::InvalidConfig("bad".into()))
            })
            .await;
        assert_eq!(result.unwrap_err().0, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
