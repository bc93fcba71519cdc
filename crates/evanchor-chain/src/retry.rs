//! Backoff for idempotent node reads.
//!
//! A read is repeated when it fails with an error that
//! [`AnchoringError::is_retryable`] accepts: transport failures and 5xx
//! answers. Submissions never go through here; resending a transaction is a
//! new attempt and belongs to the caller.

use std::future::Future;
use std::time::Duration;

use crate::error::AnchoringError;

/// Exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Backoff {
    retries: u32,
    base: Duration,
}

impl Backoff {
    /// Schedule for algod GETs: 3 retries at 200ms, 400ms, 800ms.
    pub(crate) const READS: Self = Self {
        retries: 3,
        base: Duration::from_millis(200),
    };

    fn delay(&self, attempt: u32) -> Duration {
        self.base * 2u32.pow(attempt)
    }

    /// Run `op` until it succeeds, fails terminally, or retries run out.
    pub(crate) async fn run<T, F, Fut>(&self, endpoint: &str, op: F) -> Result<T, AnchoringError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AnchoringError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = self.delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        endpoint,
                        attempt,
                        max_retries = self.retries,
                        "algod read failed, retrying in {delay:?}: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> AnchoringError {
        AnchoringError::Api {
            endpoint: "GET /v2/status".into(),
            status: 503,
            body: String::new(),
        }
    }

    #[test]
    fn test_read_delays_double() {
        let b = Backoff::READS;
        assert_eq!(b.delay(0), Duration::from_millis(200));
        assert_eq!(b.delay(1), Duration::from_millis(400));
        assert_eq!(b.delay(2), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_retried_until_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let out = Backoff::READS
            .run("GET /v2/status", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok(7u64)
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_retries() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let err = Backoff::READS
            .run("GET /v2/status", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AnchoringError::Network {
                    endpoint: "GET /v2/status".into(),
                    message: "connection refused".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AnchoringError::Network { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let err = Backoff::READS
            .run("GET /v2/accounts/X", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AnchoringError::Api {
                    endpoint: "GET /v2/accounts/X".into(),
                    status: 404,
                    body: String::new(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AnchoringError::Api { status: 404, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
