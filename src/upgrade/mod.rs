//! Installing, stashing and reverting the ipfs binary.
//!
//! # Architecture Overview
//!
//! - **[`Installer`]**: the install state machine and the revert workflow
//! - **[`StashManager`]**: backups in `<ipfs_dir>/old-bin`
//! - **[`MigrationCoordinator`]**: repo version checks after an install
//! - **[`BinaryVerifier`]**: the gate a download must pass ([`SmokeTest`] by default)
//! - **[`BinaryLocator`]**: where the current binary lives ([`SystemLocator`] by default)
//!
//! ## Install Flow
//!
//! ```text
//! 1. Resolve
//!    ├── Resolve latest / latest-stable through the fetcher
//!    ├── Ask the node or the binary on PATH for the current version
//!    └── Stop early if it already matches; refuse downgrades
//!
//! 2. Acquire (nothing written outside a scratch dir)
//!    ├── Download <dist>/<version>/<dist>_<version>_<os>-<arch>.<ext>
//!    ├── Extract <dist>/ipfs
//!    └── Smoke test, unless --no-check
//!
//! 3. Replace (rolled back on failure)
//!    ├── Move the current binary to old-bin/ipfs-<current>
//!    ├── Copy the new binary into place and check its SHA-256
//!    └── Migrate the repo if the new binary expects another version
//!
//! 4. Commit
//! ```
//!
//! Only one updater may touch an ipfs directory at a time; see [`UpdateLock`].

pub mod acquire;
pub mod archive;
pub mod installer;
pub mod locator;
pub mod lock;
pub mod migration;
pub mod stash;
pub mod verification;

pub use installer::{Cancellation, InstallOutcome, InstallRequest, InstallStage, Installer};
pub use locator::{BinaryLocator, SystemLocator};
pub use lock::UpdateLock;
pub use migration::{
    MigrationCoordinator, MigrationOutcome, MigrationRunner, RepoMigrationRunner, SkipReason,
};
pub use stash::{StashEntry, StashManager};
pub use verification::{BinaryVerifier, SmokeTest};

use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by the installer's pluggable collaborators.
pub type StepFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;
