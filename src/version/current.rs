//! Discovering which ipfs version is installed right now.

use super::normalize_version;
use crate::config::UpdateConfig;
use crate::constants::NO_VERSION;
use crate::fetch::NodeApi;
use anyhow::{Context, Result, bail};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

/// Finds the installed binary and asks it (or the running node) for its version.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    config: UpdateConfig,
    search_path: Option<OsString>,
}

impl VersionResolver {
    /// Resolver searching `PATH`.
    #[must_use]
    pub fn new(config: &UpdateConfig) -> Self {
        Self {
            config: config.clone(),
            search_path: None,
        }
    }

    /// Search these directories instead of `PATH`.
    #[must_use]
    pub fn with_search_path(mut self, paths: impl Into<OsString>) -> Self {
        self.search_path = Some(paths.into());
        self
    }

    /// The installed version as `vX.Y.Z`, or `"none"`.
    ///
    /// Tries, in order: the running node's API, the binary found on the search path.
    /// Never fails: a binary that cannot report its version is logged and treated as
    /// absent.
    pub async fn current_version(&self) -> String {
        match NodeApi::discover(&self.config).await {
            Ok(api) => match api.version().await {
                Ok(version) => return normalize_version(&version),
                Err(e) => debug!("No running node to ask for its version: {e:#}"),
            },
            Err(e) => debug!("Could not build API client: {e:#}"),
        }

        let Some(binary) = self.find_binary() else {
            debug!("No {} binary found", self.config.binary_name);
            return NO_VERSION.to_string();
        };

        match binary_version(&binary).await {
            Ok(version) => version,
            Err(e) => {
                warn!("Found {:?} but could not get its version: {e:#}", binary);
                NO_VERSION.to_string()
            }
        }
    }

    /// Absolute path of the installed binary, if there is one.
    #[must_use]
    pub fn find_binary(&self) -> Option<PathBuf> {
        let name = self.config.exe_name();
        let found = match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().ok()?;
                which::which_in(&name, Some(paths), cwd)
            }
            None => which::which(&name),
        };
        found.ok()
    }
}

/// Run `<binary> version -n` and normalize what it prints.
///
/// # Errors
///
/// Returns an error if the binary cannot be run, exits unsuccessfully or prints nothing.
pub async fn binary_version(binary: &Path) -> Result<String> {
    let output = Command::new(binary)
        .args(["version", "-n"])
        .output()
        .await
        .with_context(|| format!("Failed to run {}", binary.display()))?;

    if !output.status.success() {
        bail!(
            "`{} version -n` exited with {}: {}",
            binary.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() {
        bail!("`{} version -n` printed nothing", binary.display());
    }
    Ok(normalize_version(&version))
}
