use super::{FetchFuture, Fetcher, dist_path_join, error_body, read_limited};
use crate::config::{UpdateConfig, user_agent};
use crate::core::UpdateError;
use anyhow::{Context, Result};
use tracing::debug;

/// Fetches distribution files through a public HTTP gateway.
///
/// `kubo/versions` becomes `GET <gateway><dist_path>/kubo/versions`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    gateway: String,
    dist_path: String,
    limit: Option<u64>,
}

impl HttpFetcher {
    /// Build a fetcher from the gateway, distribution root and size limit in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &UpdateConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            gateway: config.gateway_url.trim_end_matches('/').to_string(),
            dist_path: config.dist_path.clone(),
            limit: config.effective_fetch_limit(),
        })
    }

    /// Full URL for a logical path.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.gateway, dist_path_join(&self.dist_path, path))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url_for(path);
        debug!("GET {}", url);

        let transport = |reason: String| UpdateError::TransportError {
            path: path.to_string(),
            reason,
        };

        let response =
            self.client.get(&url).send().await.map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = error_body(response).await;
            return Err(transport(format!("{status}: {body}")).into());
        }

        Ok(read_limited(response, self.limit).await.map_err(|e| transport(e.to_string()))?)
    }
}

impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "gateway"
    }

    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a, Vec<u8>> {
        Box::pin(self.get(path))
    }
}
