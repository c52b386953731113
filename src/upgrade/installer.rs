//! The install state machine.
//!
//! An install walks through [`InstallStage`]s in order. The update lock is taken
//! once the downgrade gate has passed, and no binary is touched before the stash
//! step; from then until the final commit an install session guard owns the
//! attempt and, if it is dropped without committing (error, cancellation or panic),
//! moves the stashed binary back where it came from.

use super::acquire::{fetch_binary, release_dist_name};
use super::lock::UpdateLock;
use super::locator::{BinaryLocator, SystemLocator};
use super::migration::{MigrationCoordinator, MigrationOutcome, MigrationRunner, RepoMigrationRunner};
use super::stash::{StashManager, install_binary};
use super::verification::{BinaryVerifier, SmokeTest};
use crate::config::UpdateConfig;
use crate::constants::NO_VERSION;
use crate::core::UpdateError;
use crate::fetch::Fetcher;
use crate::version::{compare_versions, resolve_target};
use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// `vX.Y.Z`, `latest` or `latest-stable`
    pub version: String,
    /// Skip the verification gate
    pub no_check: bool,
    /// Permit installing an older version than the current one
    pub allow_downgrade: bool,
}

impl InstallRequest {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            no_check: false,
            allow_downgrade: false,
        }
    }

    #[must_use]
    pub const fn with_no_check(mut self, no_check: bool) -> Self {
        self.no_check = no_check;
        self
    }

    #[must_use]
    pub const fn with_allow_downgrade(mut self, allow_downgrade: bool) -> Self {
        self.allow_downgrade = allow_downgrade;
        self
    }
}

/// Steps of an install, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstallStage {
    ResolveCurrent,
    CheckTrivialNoop,
    CompareForDowngrade,
    Download,
    Verify,
    Stash,
    SelectInstallLocation,
    Install,
    MigrationCheck,
    Commit,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResolveCurrent => "resolve current version",
            Self::CheckTrivialNoop => "check installed version",
            Self::CompareForDowngrade => "downgrade check",
            Self::Download => "download",
            Self::Verify => "verification",
            Self::Stash => "stash",
            Self::SelectInstallLocation => "select install location",
            Self::Install => "install",
            Self::MigrationCheck => "migration check",
            Self::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// How an install ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The requested version was already installed; nothing was written.
    AlreadyInstalled { version: String },
    /// The new binary is in place.
    Installed {
        version: String,
        path: PathBuf,
        migration: MigrationOutcome,
    },
}

/// Cancellation signal shared with a Ctrl-C listener.
///
/// ```rust
/// use ipfs_update::upgrade::Cancellation;
///
/// let (trigger, cancel) = Cancellation::channel();
/// trigger.send(true).ok();
/// # drop(cancel);
/// ```
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// A signal and the sender that fires it (by sending `true`).
    #[must_use]
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        Self::channel().1
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancelled. Pends forever if the sender is gone.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// State of one install attempt. Rolls back on drop unless committed.
struct InstallSession {
    stash: StashManager,
    current: String,
    target: String,
    scratch: TempDir,
    binary_file: String,
    /// Directory the previous binary was stashed from
    stashed_from: Option<PathBuf>,
    install_path: Option<PathBuf>,
    succeeded: bool,
}

impl InstallSession {
    fn new(config: &UpdateConfig, current: String, target: String) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("ipfs-update")
            .tempdir()
            .context("Failed to create scratch directory")?;
        Ok(Self {
            stash: StashManager::new(config),
            current,
            target,
            scratch,
            binary_file: config.exe_name(),
            stashed_from: None,
            install_path: None,
            succeeded: false,
        })
    }

    /// Downloaded, not yet installed executable.
    fn temp_binary_path(&self) -> PathBuf {
        self.scratch.path().join(&self.binary_file)
    }

    fn record_stash(&mut self, original: PathBuf) {
        self.stashed_from = original.parent().map(Path::to_path_buf);
        self.install_path = Some(original);
    }

    fn commit(&mut self) {
        self.succeeded = true;
    }
}

impl Drop for InstallSession {
    fn drop(&mut self) {
        if self.succeeded {
            return;
        }
        if let (Some(_), Some(install_path)) = (&self.stashed_from, &self.install_path) {
            warn!("install failed, reverting changes...");
            self.stash.revert(install_path, &self.current);
        }
    }
}

/// Installs, and reverts to, ipfs binaries.
///
/// Collaborators default to the real system ([`SystemLocator`], [`SmokeTest`],
/// [`RepoMigrationRunner`]) and can be swapped with the `with_*` builders.
///
/// ```rust,no_run
/// use ipfs_update::config::UpdateConfig;
/// use ipfs_update::fetch::default_fetcher;
/// use ipfs_update::upgrade::{InstallRequest, Installer};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = UpdateConfig::default();
/// let installer = Installer::new(&config, default_fetcher(&config)?);
/// let outcome = installer.install(&InstallRequest::new("latest")).await?;
/// println!("{outcome:?}");
/// # Ok(())
/// # }
/// ```
pub struct Installer {
    config: UpdateConfig,
    fetcher: Arc<dyn Fetcher>,
    locator: Arc<dyn BinaryLocator>,
    verifier: Arc<dyn BinaryVerifier>,
    migrations: MigrationCoordinator,
    cancel: Cancellation,
}

impl Installer {
    #[must_use]
    pub fn new(config: &UpdateConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config: config.clone(),
            fetcher,
            locator: Arc::new(SystemLocator::new(config)),
            verifier: Arc::new(SmokeTest::new(config)),
            migrations: MigrationCoordinator::new(config, Arc::new(RepoMigrationRunner::new(config))),
            cancel: Cancellation::never(),
        }
    }

    #[must_use]
    pub fn with_locator(mut self, locator: Arc<dyn BinaryLocator>) -> Self {
        self.locator = locator;
        self
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn BinaryVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    #[must_use]
    pub fn with_migration_runner(mut self, runner: Arc<dyn MigrationRunner>) -> Self {
        self.migrations = MigrationCoordinator::new(&self.config, runner);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Install the requested version.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::LockBusy`] if another run holds the lock
    /// - [`UpdateError::DowngradeRefused`] for an older target without `allow_downgrade`
    /// - transport, decode and verification errors, with nothing changed on disk
    /// - install and migration errors, after the previous binary has been restored
    /// - [`UpdateError::Cancelled`] if cancelled during download, verification or
    ///   the migration check
    pub async fn install(&self, request: &InstallRequest) -> Result<InstallOutcome> {
        let target = resolve_target(self.fetcher.as_ref(), &self.config.dist_name, &request.version).await?;

        enter(InstallStage::ResolveCurrent);
        let current = self.locator.current_version().await?;
        info!("Current version: {}, target version: {}", current, target);

        enter(InstallStage::CheckTrivialNoop);
        if current == target {
            info!("Already have version {} installed, skipping.", target);
            return Ok(InstallOutcome::AlreadyInstalled {
                version: target,
            });
        }

        enter(InstallStage::CompareForDowngrade);
        if current != NO_VERSION && !request.allow_downgrade {
            match compare_versions(&target, &current) {
                Ok(Ordering::Less) => {
                    return Err(UpdateError::DowngradeRefused {
                        current,
                        target,
                    }
                    .into());
                }
                Ok(_) => {}
                Err(e) => warn!("Cannot order {} against {}: {}", target, current, e),
            }
        }

        // Not before here: a noop or refused downgrade must not create the lock file
        let _lock = UpdateLock::acquire(&self.config.lock_path())?;
        let mut session = InstallSession::new(&self.config, current, target)?;
        let temp_binary = session.temp_binary_path();

        enter(InstallStage::Download);
        let dist = release_dist_name(&self.config.dist_name, &session.target);
        self.guarded(
            InstallStage::Download,
            fetch_binary(
                self.fetcher.as_ref(),
                &dist,
                &session.target,
                &self.config.binary_name,
                &temp_binary,
            ),
        )
        .await?;

        enter(InstallStage::Verify);
        if request.no_check {
            info!("skipping tests since '--no-check' was passed");
        } else {
            self.guarded(InstallStage::Verify, self.verifier.verify(&temp_binary, &session.target))
                .await?;
        }

        enter(InstallStage::Stash);
        let installed = self.locator.find_installed();
        match session.stash.stash(installed.as_deref(), &session.current, false) {
            Ok(original) => session.record_stash(original),
            Err(e) if e.downcast_ref::<UpdateError>().is_some_and(UpdateError::is_soft) => {
                info!("stash failed, no binary found.");
                info!("this could be because the daemon is running but its binary is not on PATH");
                debug!("{e:#}");
            }
            Err(e) => return Err(e.context("Failed to stash the current binary")),
        }

        enter(InstallStage::SelectInstallLocation);
        let install_path = match session.install_path.clone() {
            Some(path) => path,
            None => {
                let path = self.locator.install_dir()?.join(self.config.exe_name());
                session.install_path = Some(path.clone());
                path
            }
        };

        enter(InstallStage::Install);
        install_binary(&temp_binary, &install_path)?;

        enter(InstallStage::MigrationCheck);
        let migration = self
            .guarded(
                InstallStage::MigrationCheck,
                self.migrations.check(self.fetcher.as_ref(), &install_path, &session.target),
            )
            .await?;

        enter(InstallStage::Commit);
        session.commit();
        info!("Installed {} to {}", session.target, install_path.display());

        Ok(InstallOutcome::Installed {
            version: session.target.clone(),
            path: install_path,
            migration,
        })
    }

    /// Put a stashed binary back at the location recorded in `path-old`, remove the
    /// stash, and bring the repository to the version the restored binary expects.
    ///
    /// # Errors
    ///
    /// Returns an error if the restore fails or the migration runner fails.
    pub async fn revert(&self, stash: &Path) -> Result<(PathBuf, MigrationOutcome)> {
        let _lock = UpdateLock::acquire(&self.config.lock_path())?;
        let manager = StashManager::new(&self.config);
        let version = stash_version(stash, &self.config.binary_name);

        let restored = manager.restore(stash)?;
        info!("Reverted to {} at {}", version, restored.display());

        let migration = self
            .guarded(
                InstallStage::MigrationCheck,
                self.migrations.check(self.fetcher.as_ref(), &restored, &version),
            )
            .await?;
        Ok((restored, migration))
    }

    /// Race `step` against cancellation.
    async fn guarded<T>(&self, stage: InstallStage, step: impl Future<Output = Result<T>>) -> Result<T> {
        let mut cancel = self.cancel.clone();
        tokio::select! {
            result = step => result,
            () = cancel.cancelled() => {
                warn!("Cancelled during {}", stage);
                Err(UpdateError::Cancelled {
                    stage: stage.to_string(),
                }
                .into())
            }
        }
    }
}

fn enter(stage: InstallStage) {
    debug!(stage = %stage, "Install step");
}

/// The tag part of `old-bin/<binary>-<tag>`.
fn stash_version(stash: &Path, binary_name: &str) -> String {
    let name = stash.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    name.strip_prefix(&format!("{binary_name}-")).map_or(name.clone(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(InstallStage::Download < InstallStage::Verify);
        assert!(InstallStage::Stash < InstallStage::Install);
        assert!(InstallStage::MigrationCheck < InstallStage::Commit);
        assert_eq!(InstallStage::MigrationCheck.to_string(), "migration check");
    }

    #[test]
    fn test_stash_version() {
        assert_eq!(stash_version(Path::new("/r/old-bin/ipfs-v0.17.0"), "ipfs"), "v0.17.0");
        assert_eq!(stash_version(Path::new("/r/old-bin/custom"), "ipfs"), "custom");
    }

    #[tokio::test]
    async fn test_cancellation_fires() {
        let (trigger, mut cancel) = Cancellation::channel();
        assert!(!cancel.is_cancelled());
        trigger.send(true).unwrap();
        cancel.cancelled().await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_cancelled_stays_pending() {
        let mut cancel = Cancellation::never();
        let waited = tokio::time::timeout(std::time::Duration::from_millis(50), cancel.cancelled()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_session_without_stash_does_not_revert() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = UpdateConfig::default().with_ipfs_dir(temp.path().join("repo"));
        let target = temp.path().join("ipfs");
        std::fs::write(&target, b"new").unwrap();

        let mut session = InstallSession::new(&config, "v0.17.0".into(), "v0.18.1".into()).unwrap();
        session.install_path = Some(target.clone());
        drop(session);

        assert_eq!(std::fs::read(&target).unwrap(), b"new");
    }

    #[test]
    fn test_uncommitted_session_reverts_on_panic() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = UpdateConfig::default().with_ipfs_dir(temp.path().join("repo"));
        let installed = temp.path().join("ipfs");
        std::fs::write(&installed, b"old").unwrap();

        let result = std::panic::catch_unwind(|| {
            let mut session = InstallSession::new(&config, "v0.17.0".into(), "v0.18.1".into()).unwrap();
            let original = session.stash.stash(Some(&installed), "v0.17.0", false).unwrap();
            session.record_stash(original);
            std::fs::write(&installed, b"half-written new").unwrap();
            panic!("install blew up");
        });

        assert!(result.is_err());
        assert_eq!(std::fs::read(&installed).unwrap(), b"old");
    }
}
