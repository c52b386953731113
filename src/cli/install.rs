use crate::config::UpdateConfig;
use crate::fetch::default_fetcher;
use crate::upgrade::{Cancellation, InstallOutcome, InstallRequest, Installer};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::warn;

/// `ipfs-update install <version>`
///
/// ```bash
/// ipfs-update install latest
/// ipfs-update install v0.17.0 --allow-downgrade
/// ipfs-update install v0.18.1 --no-check
/// ```
#[derive(Args, Debug)]
pub struct InstallCommand {
    /// Version to install: vX.Y.Z, latest or latest-stable
    #[arg(value_name = "VERSION")]
    pub version: String,

    /// Skip the smoke test of the new binary
    #[arg(long)]
    pub no_check: bool,

    /// Allow installing a version older than the current one
    #[arg(long)]
    pub allow_downgrade: bool,
}

impl InstallCommand {
    /// Install the requested version. Ctrl-C cancels the download, the smoke test or
    /// the migration check and restores the previous binary.
    ///
    /// # Errors
    ///
    /// Returns the install error after any rollback has run.
    pub async fn execute(self, config: &UpdateConfig) -> Result<()> {
        let fetcher = default_fetcher(config)?;

        let (trigger, cancel) = Cancellation::channel();
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling...");
                let _ = trigger.send(true);
            }
        });

        let request = InstallRequest::new(self.version)
            .with_no_check(self.no_check)
            .with_allow_downgrade(self.allow_downgrade);
        let installer = Installer::new(config, fetcher.clone()).with_cancellation(cancel);
        let outcome = installer.install(&request).await;

        listener.abort();
        fetcher.close().await?;

        match outcome? {
            InstallOutcome::AlreadyInstalled { .. } => {}
            InstallOutcome::Installed { version, path, migration } => {
                println!("{}", "Installation complete!".green());
                println!("Installed {} to {} ({})", version.bold(), path.display(), migration);
            }
        }
        Ok(())
    }
}
