//! Where the ipfs binary is installed, and where a fresh one should go.

use super::StepFuture;
use crate::config::UpdateConfig;
use crate::utils::fs::can_write;
use crate::utils::platform::is_in_path;
use crate::version::VersionResolver;
use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Answers the installer's questions about the host.
pub trait BinaryLocator: Send + Sync {
    /// Installed version, `"none"` if nothing is installed.
    fn current_version(&self) -> StepFuture<'_, String>;

    /// Path of the installed binary, if any.
    fn find_installed(&self) -> Option<PathBuf>;

    /// Directory for a first install.
    ///
    /// # Errors
    ///
    /// Returns an error if no suitable directory exists.
    fn install_dir(&self) -> Result<PathBuf>;
}

/// [`BinaryLocator`] backed by `PATH` and the running node.
#[derive(Debug, Clone)]
pub struct SystemLocator {
    resolver: VersionResolver,
}

impl SystemLocator {
    #[must_use]
    pub fn new(config: &UpdateConfig) -> Self {
        Self {
            resolver: VersionResolver::new(config),
        }
    }
}

impl BinaryLocator for SystemLocator {
    fn current_version(&self) -> StepFuture<'_, String> {
        Box::pin(async move { Ok(self.resolver.current_version().await) })
    }

    fn find_installed(&self) -> Option<PathBuf> {
        self.resolver.find_binary()
    }

    fn install_dir(&self) -> Result<PathBuf> {
        find_install_dir()
    }
}

/// Pick a directory for a binary that is not installed anywhere yet.
///
/// Candidates, first match wins:
/// 1. `go env GOBIN`, then `bin` under each `GOPATH` entry
/// 2. on Windows, the working directory and the directory of this executable
/// 3. `/usr/local/bin`, `/usr/bin` if writable
/// 4. `~/.local/bin`, `~/bin`, created if missing
///
/// Every candidate must be on `PATH`.
///
/// # Errors
///
/// Returns an error listing the candidates if none qualifies.
pub fn find_install_dir() -> Result<PathBuf> {
    let mut candidates = go_bin_dirs();

    if cfg!(windows) {
        candidates.extend(std::env::current_dir().ok());
        candidates.extend(std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)));
    }

    candidates.push(PathBuf::from("/usr/local/bin"));
    candidates.push(PathBuf::from("/usr/bin"));

    for dir in &candidates {
        if is_in_path(dir) && dir.is_dir() && can_write(dir) {
            debug!("Installing to {}", dir.display());
            return Ok(dir.clone());
        }
    }

    if let Some(home) = dirs::home_dir() {
        for dir in [home.join(".local").join("bin"), home.join("bin")] {
            if !is_in_path(&dir) {
                continue;
            }
            if !dir.exists() && std::fs::create_dir_all(&dir).is_err() {
                continue;
            }
            if can_write(&dir) {
                debug!("Installing to {}", dir.display());
                return Ok(dir);
            }
        }
    }

    Err(anyhow!(
        "no writable install directory on PATH; tried GOBIN, GOPATH/bin, /usr/local/bin, /usr/bin, ~/.local/bin and ~/bin"
    ))
}

fn go_bin_dirs() -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = go_env_gobin().into_iter().collect();
    if let Some(gopath) = std::env::var_os("GOPATH") {
        found.extend(std::env::split_paths(&gopath).map(|p| p.join("bin")));
    }
    found
}

fn go_env_gobin() -> Option<PathBuf> {
    let output = Command::new("go").args(["env", "GOBIN"]).output().ok()?;
    let gobin = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (output.status.success() && !gobin.is_empty()).then(|| PathBuf::from(gobin))
}
