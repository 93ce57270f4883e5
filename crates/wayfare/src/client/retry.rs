use std::future::Future;
use std::time::Duration;
use tracing::debug;

use wayfare_core::{ApiError, Result};

/// Delay unit for exponential backoff
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Runs an operation with a per-attempt timeout and exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor {
    base_delay: Duration,
    max_delay: Option<Duration>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: None,
        }
    }
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay unit
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Cap every delay
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay after failed attempt `attempt` (0-based): `base * 2^attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Run `op` up to `retries + 1` times
    ///
    /// Each attempt races `timeout`. Retryable failures sleep for the
    /// attempt's backoff before the next attempt; anything else returns
    /// at once. `on_retry` sees the attempt number about to run.
    pub async fn execute<V, F, Fut, R>(
        &self,
        op: F,
        retries: u32,
        timeout: Duration,
        mut on_retry: R,
    ) -> Result<V>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V>>,
        R: FnMut(u32, &ApiError),
    {
        let mut attempt = 0;
        loop {
            let err = match tokio::time::timeout(timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => ApiError::timeout(timeout),
            };

            if !err.is_retryable() || attempt >= retries {
                return Err(err);
            }

            let delay = self.backoff(attempt);
            debug!(
                target: "wayfare",
                attempt,
                delay_ms = delay.as_millis() as u64,
                kind = %err.kind,
                "Retrying after failure"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            on_retry(attempt, &err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;
    use wayfare_core::ErrorKind;

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryExecutor::new();
        let delays: Vec<u64> = (0..4).map(|n| retry.backoff(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000]);
    }

    #[test]
    fn test_backoff_cap() {
        let retry = RetryExecutor::new().with_max_delay(Duration::from_secs(30));
        assert_eq!(retry.backoff(4), Duration::from_secs(16));
        assert_eq!(retry.backoff(5), Duration::from_secs(30));
        assert_eq!(retry.backoff(40), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let mut seen = Vec::new();

        let result = RetryExecutor::new()
            .execute(
                || {
                    let calls = calls.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(ApiError::network("connection reset"))
                        } else {
                            Ok("ok")
                        }
                    }
                },
                3,
                Duration::from_secs(10),
                |attempt, _| seen.push(attempt),
            )
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(seen, vec![1, 2]);
        // 1s + 2s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_aborts() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = RetryExecutor::new()
            .execute(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(ApiError::from_status(401, "expired"))
                    }
                },
                3,
                Duration::from_secs(10),
                |_, _| {},
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::AuthenticationError);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retryable() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = RetryExecutor::new()
            .execute(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(())
                    }
                },
                1,
                Duration::from_millis(500),
                |_, _| {},
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::ApiTimeout);
        assert_eq!(err.message, "request timeout after 500ms");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
