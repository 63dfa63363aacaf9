//! Fixed-delay retry for transient device failures.

use crate::ports::device::DeviceError;
use std::future::Future;
use std::time::Duration;

/// Matches the vendor client: a fixed number of attempts with a fixed sleep
/// between them. Permanent errors are returned immediately; exhaustion
/// returns the last error.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying while it fails with a transient error.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, DeviceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DeviceError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "transient device failure, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_first_success_needs_no_retry() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DeviceError::Timeout)
                    } else {
                        Ok("up")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "up");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DeviceError::Connect("refused".into())) }
            })
            .await;
        assert!(matches!(result, Err(DeviceError::Connect(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DeviceError::Status { code: 404 }) }
            })
            .await;
        assert!(matches!(result, Err(DeviceError::Status { code: 404 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
