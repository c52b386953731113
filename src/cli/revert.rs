use crate::config::UpdateConfig;
use crate::core::UpdateError;
use crate::fetch::default_fetcher;
use crate::upgrade::{Installer, StashManager};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

/// `ipfs-update revert`
///
/// With several backups in `old-bin` the operator picks one on stdin; `0` aborts.
#[derive(Args, Debug)]
pub struct RevertCommand {}

impl RevertCommand {
    /// Restore a stashed binary to where it was installed from.
    ///
    /// # Errors
    ///
    /// Returns an error if there is nothing to revert to or the restore fails. Aborting
    /// at the prompt is not an error.
    pub async fn execute(self, config: &UpdateConfig) -> Result<()> {
        let manager = StashManager::new(config);
        let selection = tokio::task::spawn_blocking(move || {
            manager.select_for_revert(std::io::stdin().lock(), std::io::stdout())
        })
        .await
        .context("Stash selection task panicked")?;

        let stash = match selection {
            Ok(stash) => stash,
            Err(e) if matches!(e.downcast_ref::<UpdateError>(), Some(UpdateError::UserAborted)) => {
                println!("{}", "aborted".yellow());
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let fetcher = default_fetcher(config)?;
        let result = Installer::new(config, fetcher.clone()).revert(&stash).await;
        fetcher.close().await?;

        let (restored, migration) = result?;
        println!("{}", "Revert complete.".green());
        println!("Restored {} ({})", restored.display(), migration);
        Ok(())
    }
}
