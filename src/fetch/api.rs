use super::{FetchFuture, Fetcher, dist_path_join, error_body, read_limited};
use crate::config::{UpdateConfig, user_agent};
use crate::constants::API_PROBE_TIMEOUT;
use crate::core::UpdateError;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

/// Turn the multiaddr a daemon writes to `<ipfs_dir>/api` into `host:port`.
///
/// ```rust
/// use ipfs_update::fetch::parse_api_multiaddr;
///
/// assert_eq!(parse_api_multiaddr("/ip4/127.0.0.1/tcp/5001").unwrap(), "127.0.0.1:5001");
/// assert_eq!(parse_api_multiaddr("/ip6/::1/tcp/5001").unwrap(), "[::1]:5001");
/// assert!(parse_api_multiaddr("/unix/tmp/api.sock").is_err());
/// ```
///
/// # Errors
///
/// Returns an error unless the address has the form `/<ip4|ip6|dns|dns4|dns6>/<host>/tcp/<port>`.
pub fn parse_api_multiaddr(addr: &str) -> Result<String> {
    let addr = addr.trim();
    let parts: Vec<&str> = addr.split('/').collect();
    if parts.len() != 5 || !parts[0].is_empty() || parts[3] != "tcp" {
        bail!("unrecognized api multiaddr: {addr}");
    }
    let port: u16 = parts[4].parse().with_context(|| format!("invalid port in api multiaddr: {addr}"))?;

    match parts[1] {
        "ip4" | "dns" | "dns4" | "dns6" => Ok(format!("{}:{}", parts[2], port)),
        "ip6" => Ok(format!("[{}]:{}", parts[2], port)),
        other => bail!("unsupported protocol '{other}' in api multiaddr: {addr}"),
    }
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(rename = "Version")]
    version: String,
}

/// Minimal client for a local node's HTTP RPC API.
#[derive(Debug, Clone)]
pub struct NodeApi {
    client: reqwest::Client,
    base_url: String,
}

impl NodeApi {
    /// Client for the API at `base_url` (e.g. `http://127.0.0.1:5001`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Locate the API: the repo's `api` file when present and valid, `config.api_url`
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub async fn discover(config: &UpdateConfig) -> Result<Self> {
        Self::new(discover_base_url(&config.api_file(), &config.api_url).await)
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Version reported by the running node, without a `v` prefix. Times out quickly.
    ///
    /// # Errors
    ///
    /// Returns an error if no node answers within the probe timeout.
    pub async fn version(&self) -> Result<String> {
        let url = format!("{}/api/v0/version", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(API_PROBE_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("No ipfs node answering at {}", self.base_url))?
            .error_for_status()
            .context("Node rejected version request")?;

        let body: VersionResponse =
            response.json().await.context("Failed to decode version response")?;
        Ok(body.version)
    }

    /// `ipfs cat <ipfs_path>` through the API.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::TransportError`] on connection failures and error statuses.
    pub async fn cat(&self, ipfs_path: &str, limit: Option<u64>) -> Result<Vec<u8>> {
        let transport = |reason: String| UpdateError::TransportError {
            path: ipfs_path.to_string(),
            reason,
        };

        let url = format!("{}/api/v0/cat", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("arg", ipfs_path)])
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = error_body(response).await;
            return Err(transport(format!("{status}: {body}")).into());
        }

        Ok(read_limited(response, limit).await.map_err(|e| transport(e.to_string()))?)
    }
}

async fn discover_base_url(api_file: &std::path::Path, fallback: &str) -> String {
    let Ok(contents) = tokio::fs::read_to_string(api_file).await else {
        return fallback.to_string();
    };
    match parse_api_multiaddr(&contents) {
        Ok(host_port) => format!("http://{host_port}"),
        Err(e) => {
            debug!("Ignoring {:?}: {e}", api_file);
            fallback.to_string()
        }
    }
}

/// Fetches distribution files through the local node's `cat` endpoint.
///
/// The node is looked up on every fetch, so a daemon started mid-run is picked up. When
/// none is reachable the fetch fails fast with a transport error and a surrounding
/// [`MultiFetcher`](super::MultiFetcher) moves on to the gateway.
#[derive(Debug, Clone)]
pub struct ApiFetcher {
    api_file: PathBuf,
    fallback_url: String,
    dist_path: String,
    limit: Option<u64>,
}

impl ApiFetcher {
    /// Build a fetcher from `config`.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for parity with [`HttpFetcher::new`](super::HttpFetcher::new).
    pub fn new(config: &UpdateConfig) -> Result<Self> {
        Ok(Self {
            api_file: config.api_file(),
            fallback_url: config.api_url.clone(),
            dist_path: config.dist_path.clone(),
            limit: config.effective_fetch_limit(),
        })
    }

    async fn cat(&self, path: &str) -> Result<Vec<u8>> {
        let api = NodeApi::new(discover_base_url(&self.api_file, &self.fallback_url).await)?;

        if let Err(e) = api.version().await {
            return Err(UpdateError::TransportError {
                path: path.to_string(),
                reason: format!("local node unavailable: {e:#}"),
            }
            .into());
        }

        let ipfs_path = dist_path_join(&self.dist_path, path);
        debug!("Fetching {} from node at {}", ipfs_path, api.base_url());
        api.cat(&ipfs_path, self.limit).await
    }
}

impl Fetcher for ApiFetcher {
    fn name(&self) -> &str {
        "local node"
    }

    fn fetch<'a>(&'a self, path: &'a str) -> FetchFuture<'a, Vec<u8>> {
        Box::pin(self.cat(path))
    }
}
