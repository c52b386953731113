//! Command-line interface for ipfs-update.
//!
//! Every command builds its components from one [`UpdateConfig`], resolved from
//! the configuration file, the environment and the global flags before dispatch.
//!
//! # Commands
//!
//! - `versions` - list the versions published in the distribution
//! - `version` - print the currently installed version
//! - `install` - install a version (`latest`, `latest-stable` or `vX.Y.Z`)
//! - `stash` - back up the current binary
//! - `revert` - restore a backed-up binary
//! - `fetch` - download a binary without installing it
//!
//! # Examples
//!
//! ```bash
//! ipfs-update versions
//! ipfs-update install latest
//! ipfs-update --verbose install v0.18.1 --allow-downgrade
//! ipfs-update --distpath /ipfs/QmDist fetch v0.18.1 --output ./ipfs
//! ipfs-update revert
//! ```

mod fetch;
mod install;
mod revert;
mod stash;
mod version;
mod versions;

pub use fetch::FetchCommand;
pub use install::InstallCommand;
pub use revert::RevertCommand;
pub use stash::StashCommand;
pub use version::VersionCommand;
pub use versions::VersionsCommand;

use crate::config::UpdateConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Update and manage a local ipfs installation.
#[derive(Parser, Debug)]
#[command(
    name = "ipfs-update",
    about = "Update and manage the locally installed ipfs binary",
    version,
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Distribution root to fetch from, e.g. /ipns/dist.ipfs.tech
    #[arg(long, global = true, value_name = "PATH", env = "IPFS_DIST_PATH")]
    distpath: Option<String>,

    /// Configuration file [default: ~/.ipfs-update/config.toml]
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print all published versions, oldest first
    Versions(VersionsCommand),

    /// Print the installed version ("none" if there is none)
    Version(VersionCommand),

    /// Install a version of ipfs
    Install(InstallCommand),

    /// Back up the installed binary to <ipfs dir>/old-bin
    Stash(StashCommand),

    /// Revert to a previously stashed binary
    Revert(RevertCommand),

    /// Download a version of ipfs without installing it
    Fetch(FetchCommand),
}

impl Cli {
    /// Whether `--verbose` was passed.
    #[must_use]
    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    /// Resolve the configuration for this invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but is invalid.
    pub async fn build_config(&self) -> Result<UpdateConfig> {
        let config = UpdateConfig::load(self.config.as_deref()).await?;
        Ok(config.with_dist_path(self.distpath.as_deref()).with_verbose(self.verbose))
    }

    /// Run the selected command.
    ///
    /// # Errors
    ///
    /// Returns whatever the command fails with.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config().await?;
        tracing::debug!("Using distribution {} and ipfs dir {}", config.dist_path, config.ipfs_dir.display());

        match self.command {
            Commands::Versions(cmd) => cmd.execute(&config).await,
            Commands::Version(cmd) => cmd.execute(&config).await,
            Commands::Install(cmd) => cmd.execute(&config).await,
            Commands::Stash(cmd) => cmd.execute(&config).await,
            Commands::Revert(cmd) => cmd.execute(&config).await,
            Commands::Fetch(cmd) => cmd.execute(&config).await,
        }
    }
}
