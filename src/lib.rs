//! ipfs-update - self-update agent for a locally installed ipfs binary
//!
//! Discovers published versions in a content-addressed distribution tree, downloads
//! and smoke-tests a release, backs up the current binary, installs the new one and
//! migrates the repository when the new binary expects a different repo version. Any
//! failure after the backup restores the previous binary.
//!
//! # Architecture Overview
//!
//! The distribution is read through a [`fetch::Fetcher`]: a local node API, an HTTP
//! gateway, or both in order, wrapped with retries and a size bound. On top of that:
//!
//! - [`version`] - installed version discovery and target resolution
//!   (`latest`, `latest-stable`, explicit `vX.Y.Z`)
//! - [`upgrade`] - archive extraction, smoke test, stash/revert, repo migration and
//!   the [`upgrade::Installer`] that sequences them
//! - [`cli`] - the `ipfs-update` commands
//!
//! # Supporting Modules
//!
//! - [`config`] - `~/.ipfs-update/config.toml`, environment overrides, derived paths
//! - [`core`] - error types and user-facing error rendering
//! - [`constants`] - defaults, timeouts and file modes
//! - [`utils`] - filesystem, platform and backoff helpers
//!
//! # Distribution Layout
//!
//! ```text
//! <dist root>/
//!   kubo/
//!     versions                        # one version per line
//!     v0.18.1/
//!       kubo_v0.18.1_linux-amd64.tar.gz
//!       kubo_v0.18.1_windows-amd64.zip
//!   fs-repo-migrations/
//!     versions
//!     v2.0.2/fs-repo-migrations_v2.0.2_linux-amd64.tar.gz
//! ```
//!
//! # Local Layout
//!
//! ```text
//! $IPFS_PATH (~/.ipfs)/
//!   version                 # repo version, read by the migration check
//!   api                     # daemon API multiaddr, when a daemon is running
//!   ipfs-update.lock        # locked while install/stash/revert change files
//!   update-staging/         # scratch space for the smoke test
//!   old-bin/
//!     path-old              # where the stashed binary was installed
//!     ipfs-v0.17.0          # stashed binaries
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod fetch;
pub mod upgrade;
pub mod utils;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
