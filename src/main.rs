//! ipfs-update CLI entry point
//!
//! Parses the command line, sets up logging on stderr and runs the selected command.
//! Errors are shown with context and suggestions and the process exits with status 1.
//!
//! - `versions` - list published versions
//! - `version` - show the installed version
//! - `install` - install a version with smoke test and rollback
//! - `stash` - back up the installed binary
//! - `revert` - restore a backed-up binary
//! - `fetch` - download a binary without installing it

use anyhow::Result;
use clap::Parser;
use ipfs_update::cli;
use ipfs_update::core::user_friendly_error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // RUST_LOG wins over --verbose
    let level = if cli.verbose() { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
