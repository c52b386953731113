//! Keeping the on-disk repository in step with the installed binary.
//!
//! Every ipfs release expects a particular repository version (an integer stored in
//! `<ipfs_dir>/version`). After a new binary is installed the [`MigrationCoordinator`]
//! asks it which version it wants and, on a mismatch, hands over to a
//! [`MigrationRunner`], by default the external `fs-repo-migrations` tool.

use super::StepFuture;
use super::acquire::fetch_binary;
use crate::config::{IPFS_PATH_ENV, UpdateConfig};
use crate::constants::{MIGRATION_CHECK_MIN_VERSION, MIGRATIONS_DIST_NAME};
use crate::core::UpdateError;
use crate::fetch::Fetcher;
use crate::utils::platform::exe_name;
use crate::version::{before_version, resolve_target};
use anyhow::{Context, Result, bail};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

/// Brings a repository to a given version.
pub trait MigrationRunner: Send + Sync {
    /// Migrate the repository to `target`. `allow_revert` permits migrating down.
    ///
    /// # Errors
    ///
    /// Returns an error if the migration could not be completed.
    fn run_migration<'a>(
        &'a self,
        fetcher: &'a dyn Fetcher,
        target: u32,
        allow_revert: bool,
    ) -> StepFuture<'a, ()>;
}

/// Downloads and runs the latest stable `fs-repo-migrations`.
#[derive(Debug, Clone)]
pub struct RepoMigrationRunner {
    config: UpdateConfig,
}

impl RepoMigrationRunner {
    #[must_use]
    pub fn new(config: &UpdateConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    async fn run(&self, fetcher: &dyn Fetcher, target: u32, allow_revert: bool) -> Result<()> {
        let version = resolve_target(fetcher, MIGRATIONS_DIST_NAME, "latest-stable").await?;

        let scratch = tempfile::Builder::new()
            .prefix("ipfs-update-migrate")
            .tempdir()
            .context("Failed to create scratch directory")?;
        let tool = scratch.path().join(exe_name(MIGRATIONS_DIST_NAME));
        fetch_binary(fetcher, MIGRATIONS_DIST_NAME, &version, MIGRATIONS_DIST_NAME, &tool).await?;

        let mut command = Command::new(&tool);
        command.args(["-to", &target.to_string(), "-y"]);
        if allow_revert {
            command.arg("-revert-ok");
        }
        command.env(IPFS_PATH_ENV, &self.config.ipfs_dir);

        info!("Running {} {} to repo version {}", MIGRATIONS_DIST_NAME, version, target);
        let status = command
            .status()
            .await
            .with_context(|| format!("Failed to run {}", tool.display()))?;
        if !status.success() {
            bail!("{MIGRATIONS_DIST_NAME} exited with {status}");
        }
        Ok(())
    }
}

impl MigrationRunner for RepoMigrationRunner {
    fn run_migration<'a>(
        &'a self,
        fetcher: &'a dyn Fetcher,
        target: u32,
        allow_revert: bool,
    ) -> StepFuture<'a, ()> {
        Box::pin(self.run(fetcher, target, allow_revert))
    }
}

/// Why the migration check did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No repository has been initialized
    NoRepo,
    /// The target cannot report its repo version; it may prompt on first start
    TargetTooOld,
    /// The new binary could not be asked for its repo version
    QueryFailed,
}

/// Result of [`MigrationCoordinator::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Repository already at the expected version
    NoMigrationNeeded,
    /// The runner migrated the repository
    Migrated {
        /// Version before
        from: u32,
        /// Version after
        to: u32,
    },
    /// The check could not or need not be made
    Skipped(SkipReason),
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMigrationNeeded => write!(f, "no migration needed"),
            Self::Migrated { from, to } => write!(f, "migrated repo from version {from} to {to}"),
            Self::Skipped(SkipReason::NoRepo) => write!(f, "skipped, no repo found"),
            Self::Skipped(SkipReason::TargetTooOld) => write!(f, "skipped, target too old"),
            Self::Skipped(SkipReason::QueryFailed) => write!(f, "skipped, migrate manually"),
        }
    }
}

/// Decides whether the repository must be migrated for a newly installed binary.
#[derive(Clone)]
pub struct MigrationCoordinator {
    config: UpdateConfig,
    runner: Arc<dyn MigrationRunner>,
}

impl MigrationCoordinator {
    #[must_use]
    pub fn new(config: &UpdateConfig, runner: Arc<dyn MigrationRunner>) -> Self {
        Self {
            config: config.clone(),
            runner,
        }
    }

    /// Compare the repository version with what `new_binary` (version `target`)
    /// expects and migrate when they differ. Downward migrations are permitted.
    ///
    /// # Errors
    ///
    /// - an I/O or parse error reading `<ipfs_dir>/version`
    /// - [`UpdateError::MigrationRunFailed`] if the runner fails
    ///
    /// A binary that cannot answer `version --repo` is not an error; the outcome is
    /// [`SkipReason::QueryFailed`].
    pub async fn check(
        &self,
        fetcher: &dyn Fetcher,
        new_binary: &Path,
        target: &str,
    ) -> Result<MigrationOutcome> {
        let version_file = self.config.repo_version_file();
        if !version_file.exists() {
            info!("No ipfs repo found at {}, skipping migration check", self.config.ipfs_dir.display());
            return Ok(MigrationOutcome::Skipped(SkipReason::NoRepo));
        }

        if before_version(MIGRATION_CHECK_MIN_VERSION, target) {
            info!("Version {} cannot report its repo version; it may prompt to migrate on start", target);
            return Ok(MigrationOutcome::Skipped(SkipReason::TargetTooOld));
        }

        let content = tokio::fs::read_to_string(&version_file)
            .await
            .with_context(|| format!("Failed to read {}", version_file.display()))?;
        let current: u32 = content
            .trim()
            .parse()
            .with_context(|| format!("Invalid repo version in {}: {:?}", version_file.display(), content.trim()))?;

        let expected = match repo_version_of(new_binary).await {
            Ok(v) => v,
            Err(e) => {
                let soft = UpdateError::MigrationQueryFailed {
                    reason: format!("{e:#}"),
                };
                warn!("{soft}");
                warn!("please run the repo migration manually before starting the daemon");
                return Ok(MigrationOutcome::Skipped(SkipReason::QueryFailed));
            }
        };

        if current == expected {
            info!("Repo version {} is current", current);
            return Ok(MigrationOutcome::NoMigrationNeeded);
        }

        info!("Repo version {} does not match expected {}, migrating", current, expected);
        self.runner.run_migration(fetcher, expected, true).await.map_err(|e| {
            UpdateError::MigrationRunFailed {
                target: expected,
                reason: format!("{e:#}"),
            }
        })?;

        Ok(MigrationOutcome::Migrated {
            from: current,
            to: expected,
        })
    }
}

/// `<binary> version --repo`, parsed as an integer.
async fn repo_version_of(binary: &Path) -> Result<u32> {
    let output = Command::new(binary)
        .args(["version", "--repo"])
        .output()
        .await
        .with_context(|| format!("Failed to run {}", binary.display()))?;
    if !output.status.success() {
        bail!(
            "`version --repo` exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .trim()
        .parse()
        .with_context(|| format!("`version --repo` printed {:?}", stdout.trim()))
}
