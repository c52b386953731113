//! Reading files from the ipfs distribution.
//!
//! Everything the updater downloads (version listings, release archives, the migration
//! tool) is addressed by a *logical* path below the distribution root, for example
//! `kubo/v0.18.1/kubo_v0.18.1_linux-amd64.tar.gz`. A [`Fetcher`] maps that path onto a
//! transport:
//!
//! - [`ApiFetcher`] asks a running local node (`/api/v0/cat`)
//! - [`HttpFetcher`] goes through a public gateway
//! - [`MultiFetcher`] tries several fetchers in order
//! - [`RetryFetcher`] retries one fetcher a bounded number of times
//!
//! Every transfer is capped at a byte limit (512 MiB by default). Reading past the
//! limit truncates the body; the caller sees a short read, not an error.
//!
//! ```rust,no_run
//! use ipfs_update::config::UpdateConfig;
//! use ipfs_update::fetch::default_fetcher;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdateConfig::default();
//! let fetcher = default_fetcher(&config)?;
//! let listing = fetcher.fetch("kubo/versions").await?;
//! fetcher.close().await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod http;
mod multi;
mod retry;

pub use api::{ApiFetcher, NodeApi, parse_api_multiaddr};
pub use http::HttpFetcher;
pub use multi::MultiFetcher;
pub use retry::RetryFetcher;

use crate::config::UpdateConfig;
use crate::constants::ERROR_BODY_LIMIT;
use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by [`Fetcher`] methods.
pub type FetchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Capability to read bytes at a logical distribution path.
///
/// Implementations are stateless with respect to an update attempt and are shared
/// behind an [`Arc`]; composition is done by wrapping (see [`MultiFetcher`] and
/// [`RetryFetcher`]).
pub trait Fetcher: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Read the whole file at `path`, relative to the distribution root.
    ///
    /// # Errors
    ///
    /// Transport problems are reported as
    /// [`UpdateError::TransportError`](crate::core::UpdateError::TransportError).
    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a, Vec<u8>>;

    /// Release any resources held by the fetcher.
    fn close(&self) -> FetchFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// The fetcher the CLI uses: the local node first, then the gateway, each retried.
///
/// # Errors
///
/// Returns an error if an HTTP client cannot be built.
pub fn default_fetcher(config: &UpdateConfig) -> Result<Arc<dyn Fetcher>> {
    let api: Arc<dyn Fetcher> = Arc::new(ApiFetcher::new(config)?);
    let http: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config)?);

    let retry = |inner: Arc<dyn Fetcher>| -> Arc<dyn Fetcher> {
        Arc::new(RetryFetcher::new(inner, config.max_retries, config.retry_delay()))
    };

    Ok(Arc::new(MultiFetcher::new(vec![retry(api), retry(http)])))
}

/// Join a logical path onto the distribution root.
#[must_use]
pub fn dist_path_join(dist_path: &str, path: &str) -> String {
    format!("{}/{}", dist_path.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Accumulates a response body up to an optional byte limit.
#[derive(Debug, Default)]
pub struct LimitedBuffer {
    buf: Vec<u8>,
    limit: Option<u64>,
    truncated: bool,
}

impl LimitedBuffer {
    /// A buffer holding at most `limit` bytes (`None` for no limit).
    #[must_use]
    pub const fn new(limit: Option<u64>) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append a chunk. Returns `false` once the limit is reached and nothing more
    /// should be read.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        let Some(limit) = self.limit else {
            self.buf.extend_from_slice(chunk);
            return true;
        };

        let room = usize::try_from(limit.saturating_sub(self.buf.len() as u64)).unwrap_or(usize::MAX);
        if chunk.len() > room {
            self.buf.extend_from_slice(&chunk[..room]);
            self.truncated = true;
            return false;
        }
        self.buf.extend_from_slice(chunk);
        self.buf.len() as u64 != limit
    }

    /// Whether bytes were dropped.
    #[must_use]
    pub const fn truncated(&self) -> bool {
        self.truncated
    }

    /// The accumulated bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Drain a response body into memory, stopping at `limit` bytes.
pub(crate) async fn read_limited(
    mut response: reqwest::Response,
    limit: Option<u64>,
) -> reqwest::Result<Vec<u8>> {
    let mut buffer = LimitedBuffer::new(limit);
    while let Some(chunk) = response.chunk().await? {
        if !buffer.push(&chunk) {
            break;
        }
    }
    if buffer.truncated() {
        tracing::debug!("Response truncated at {} bytes", limit.unwrap_or_default());
    }
    Ok(buffer.into_inner())
}

/// Text of an error response, read up to [`ERROR_BODY_LIMIT`] bytes.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let body = read_limited(response, Some(ERROR_BODY_LIMIT)).await.unwrap_or_default();
    String::from_utf8_lossy(&body).trim().to_string()
}
