use super::{FetchFuture, Fetcher};
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tracing::debug;

/// Tries child fetchers in order and returns the first success.
///
/// Errors from children that were followed by a success are discarded. When every child
/// fails, the last child's error is returned, wrapped with a note that all sources
/// failed. Children are never raced.
pub struct MultiFetcher {
    fetchers: Vec<Arc<dyn Fetcher>>,
}

impl MultiFetcher {
    /// Compose `fetchers`, highest priority first.
    #[must_use]
    pub fn new(fetchers: Vec<Arc<dyn Fetcher>>) -> Self {
        Self {
            fetchers,
        }
    }

    /// The composed fetchers.
    #[must_use]
    pub fn fetchers(&self) -> &[Arc<dyn Fetcher>] {
        &self.fetchers
    }

    async fn fetch_first(&self, path: &str) -> Result<Vec<u8>> {
        let mut last_error = None;
        for fetcher in &self.fetchers {
            match fetcher.fetch(path).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    debug!("Fetching {} via {} failed: {:#}", path, fetcher.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => e.context(format!("all fetchers failed for {path}")),
            None => anyhow!("no fetchers configured"),
        })
    }

    async fn close_all(&self) -> Result<()> {
        let mut last_error = None;
        for fetcher in &self.fetchers {
            if let Err(e) = fetcher.close().await {
                last_error = Some(e);
            }
        }
        last_error.map_or(Ok(()), Err)
    }
}

impl Fetcher for MultiFetcher {
    fn name(&self) -> &str {
        "multi"
    }

    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a, Vec<u8>> {
        Box::pin(self.fetch_first(path))
    }

    fn close(&self) -> FetchFuture<'_, ()> {
        Box::pin(self.close_all())
    }
}
