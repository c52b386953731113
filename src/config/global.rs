//! Updater configuration stored in `~/.ipfs-update/config.toml`.
//!
//! The configuration is resolved once at startup and then passed, read-only, to every
//! component constructor. Precedence, lowest first:
//!
//! 1. Built-in defaults (see [`crate::constants`])
//! 2. Environment: `IPFS_PATH` for the ipfs dir, `IPFS_DIST_PATH` for the distribution root
//! 3. The configuration file
//! 4. Command-line flags (`--distpath`, `--verbose`). `--distpath` also reads
//!    `IPFS_DIST_PATH`, so a set variable wins over the file.
//!
//! # File format
//!
//! ```toml
//! ipfs_dir = "/home/alice/.ipfs"
//! dist_path = "/ipns/dist.ipfs.tech"
//! gateway_url = "https://ipfs.io"
//! max_retries = 3
//! retry_delay_ms = 0
//! ```
//!
//! Every key is optional.

use crate::constants::{
    DEFAULT_API_URL, DEFAULT_BINARY_NAME, DEFAULT_DIST_NAME, DEFAULT_DIST_PATH,
    DEFAULT_FETCH_LIMIT, DEFAULT_GATEWAY_URL, DEFAULT_MAX_RETRIES, OLD_BIN_DIR,
    STAGING_DIR,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Environment variable overriding the ipfs repository directory.
pub const IPFS_PATH_ENV: &str = "IPFS_PATH";

/// Environment variable overriding the distribution root.
pub const IPFS_DIST_PATH_ENV: &str = "IPFS_DIST_PATH";

/// Settings shared by the fetchers, the stash manager, the verifier and the installer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// The ipfs repository directory; backups live in `<ipfs_dir>/old-bin`.
    pub ipfs_dir: PathBuf,

    /// Distribution root, e.g. `/ipns/dist.ipfs.tech`. Always starts with `/`.
    pub dist_path: String,

    /// Gateway the HTTP fetcher resolves `dist_path` against.
    pub gateway_url: String,

    /// Local node API used when `<ipfs_dir>/api` does not exist.
    pub api_url: String,

    /// Distribution whose `versions` file answers `latest` queries.
    pub dist_name: String,

    /// Managed executable name, without `.exe`.
    pub binary_name: String,

    /// Byte ceiling per fetch. `0` disables the limit.
    pub fetch_limit: u64,

    /// Attempts made by the retry fetcher.
    pub max_retries: u32,

    /// Delay before the second attempt; later delays double up to a cap. `0` retries immediately.
    pub retry_delay_ms: u64,

    /// Debug logging, set from `--verbose`.
    #[serde(skip)]
    pub verbose: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            ipfs_dir: default_ipfs_dir(),
            dist_path: std::env::var(IPFS_DIST_PATH_ENV)
                .ok()
                .filter(|p| !p.is_empty())
                .map_or_else(|| DEFAULT_DIST_PATH.to_string(), |p| normalize_dist_path(&p)),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            dist_name: DEFAULT_DIST_NAME.to_string(),
            binary_name: DEFAULT_BINARY_NAME.to_string(),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: 0,
            verbose: false,
        }
    }
}

fn default_ipfs_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(IPFS_PATH_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".ipfs")
}

/// Ensure a distribution root starts with `/` and has no trailing slash.
#[must_use]
pub fn normalize_dist_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

impl UpdateConfig {
    /// Load from `path`, or from [`default_path`](Self::default_path) when `None`.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.dist_path = normalize_dist_path(&config.dist_path);
        Ok(config)
    }

    /// Write the configuration as pretty TOML, creating the parent directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// `~/.ipfs-update/config.toml`, or `%LOCALAPPDATA%\ipfs-update\config.toml` on Windows.
    ///
    /// # Errors
    ///
    /// Returns an error if the home (or local data) directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("ipfs-update")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".ipfs-update")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Apply `--distpath`.
    #[must_use]
    pub fn with_dist_path(mut self, dist_path: Option<&str>) -> Self {
        if let Some(p) = dist_path.filter(|p| !p.trim().is_empty()) {
            self.dist_path = normalize_dist_path(p);
        }
        self
    }

    /// Apply `--verbose`.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Point the configuration at another ipfs directory.
    #[must_use]
    pub fn with_ipfs_dir(mut self, ipfs_dir: impl Into<PathBuf>) -> Self {
        self.ipfs_dir = ipfs_dir.into();
        self
    }

    /// `<ipfs_dir>/old-bin`
    #[must_use]
    pub fn old_bin_dir(&self) -> PathBuf {
        self.ipfs_dir.join(OLD_BIN_DIR)
    }

    /// `<ipfs_dir>/update-staging`
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.ipfs_dir.join(STAGING_DIR)
    }

    /// `<ipfs_dir>/version`, present only when a repository has been initialized.
    #[must_use]
    pub fn repo_version_file(&self) -> PathBuf {
        self.ipfs_dir.join("version")
    }

    /// `<ipfs_dir>/api`, written by a running daemon.
    #[must_use]
    pub fn api_file(&self) -> PathBuf {
        self.ipfs_dir.join("api")
    }

    /// Lock file serializing updater runs against the same ipfs dir.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.ipfs_dir.join("ipfs-update.lock")
    }

    /// The fetch ceiling, or `None` when unlimited.
    #[must_use]
    pub const fn effective_fetch_limit(&self) -> Option<u64> {
        if self.fetch_limit == 0 { None } else { Some(self.fetch_limit) }
    }

    /// First delay between retry attempts.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Platform executable name for the managed binary.
    #[must_use]
    pub fn exe_name(&self) -> String {
        crate::utils::platform::exe_name(&self.binary_name)
    }
}

/// User agent sent with every HTTP request.
#[must_use]
pub fn user_agent() -> String {
    format!("ipfs-update/{}", env!("CARGO_PKG_VERSION"))
}
