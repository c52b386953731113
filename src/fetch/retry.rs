use super::{FetchFuture, Fetcher};
use crate::core::UpdateError;
use crate::utils::backoff::retry_delays;
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tracing::debug;

/// Retries a single fetcher up to `max_tries` times.
///
/// The first success is returned. After the last failed attempt the underlying error is
/// wrapped in [`UpdateError::RetriesExceeded`]. A typed error other than
/// [`UpdateError::TransportError`] is returned as is, without further attempts. No
/// delay is inserted between attempts unless one is configured.
pub struct RetryFetcher {
    inner: Arc<dyn Fetcher>,
    max_tries: u32,
    delay: Duration,
}

impl RetryFetcher {
    /// Wrap `inner`. A `max_tries` of zero is treated as one.
    #[must_use]
    pub fn new(inner: Arc<dyn Fetcher>, max_tries: u32, delay: Duration) -> Self {
        Self {
            inner,
            max_tries: max_tries.max(1),
            delay,
        }
    }

    async fn fetch_with_retries(&self, path: &str) -> Result<Vec<u8>> {
        let attempts = AtomicU32::new(0);
        let strategy = retry_delays(self.delay, self.max_tries);

        let result = RetryIf::spawn(
            strategy,
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt > 1 {
                    debug!("Retrying {} via {} (attempt {}/{})", path, self.inner.name(), attempt, self.max_tries);
                }
                self.inner.fetch(path)
            },
            |e: &anyhow::Error| {
                let retry = is_retryable(e);
                if !retry {
                    debug!("Not retrying {}: {}", path, e);
                }
                retry
            },
        )
        .await;

        result.map_err(|e| {
            if !is_retryable(&e) {
                return e;
            }
            e.context(UpdateError::RetriesExceeded {
                attempts: attempts.load(Ordering::SeqCst),
            })
        })
    }
}

/// Transport failures and errors of unknown kind are retried.
fn is_retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<UpdateError>().is_none_or(UpdateError::is_retryable)
}

impl Fetcher for RetryFetcher {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a, Vec<u8>> {
        Box::pin(self.fetch_with_retries(path))
    }

    fn close(&self) -> FetchFuture<'_, ()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FailingFetcher, FlakyFetcher, StaticFetcher};

    #[tokio::test]
    async fn test_succeeds_after_failures_within_bound() {
        let flaky = Arc::new(FlakyFetcher::new(2, b"payload".to_vec()));
        let retry = RetryFetcher::new(flaky.clone(), 3, Duration::ZERO);

        assert_eq!(retry.fetch("x").await.unwrap(), b"payload");
        assert_eq!(flaky.attempts(), 3);
    }

    #[tokio::test]
    async fn test_always_failing_makes_exactly_max_attempts() {
        let failing = Arc::new(FailingFetcher::new("gateway timeout"));
        let retry = RetryFetcher::new(failing.clone(), 3, Duration::ZERO);

        let err = retry.fetch("kubo/versions").await.unwrap_err();
        assert_eq!(failing.attempts(), 3);

        assert_eq!(
            err.downcast_ref::<UpdateError>(),
            Some(&UpdateError::RetriesExceeded {
                attempts: 3
            })
        );
        let rendered = format!("{err:#}");
        assert!(rendered.contains("exceeded number of retries"));
        assert!(rendered.contains("gateway timeout"));
    }

    /// Answers every fetch with a corrupt-archive error.
    #[derive(Default)]
    struct CorruptFetcher {
        attempts: AtomicU32,
    }

    impl Fetcher for CorruptFetcher {
        fn name(&self) -> &str {
            "corrupt"
        }

        fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a, Vec<u8>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                Err(UpdateError::DecodeError {
                    archive: path.to_string(),
                    reason: "bad magic".to_string(),
                }
                .into())
            })
        }
    }

    #[tokio::test]
    async fn test_non_transport_error_is_not_retried() {
        let corrupt = Arc::new(CorruptFetcher::default());
        let retry = RetryFetcher::new(corrupt.clone(), 3, Duration::ZERO);

        let err = retry.fetch("kubo/v0.18.1/x.tar.gz").await.unwrap_err();
        assert_eq!(corrupt.attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(
            err.downcast_ref::<UpdateError>(),
            Some(UpdateError::DecodeError { .. })
        ));
    }

    #[tokio::test]
    async fn test_first_success_makes_one_attempt() {
        let good = Arc::new(StaticFetcher::new().with_file("x", b"ok"));
        let retry = RetryFetcher::new(good.clone(), 5, Duration::from_secs(60));

        assert_eq!(retry.fetch("x").await.unwrap(), b"ok");
        assert_eq!(good.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_tries_means_one() {
        let failing = Arc::new(FailingFetcher::new("nope"));
        let retry = RetryFetcher::new(failing.clone(), 0, Duration::ZERO);

        assert!(retry.fetch("x").await.is_err());
        assert_eq!(failing.attempts(), 1);
    }

    #[tokio::test]
    async fn test_configured_delay_is_honored() {
        let flaky = Arc::new(FlakyFetcher::new(1, b"late".to_vec()));
        let retry = RetryFetcher::new(flaky, 2, Duration::from_millis(50));

        let start = std::time::Instant::now();
        assert_eq!(retry.fetch("x").await.unwrap(), b"late");
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
