use crate::config::UpdateConfig;
use crate::constants::NO_VERSION;
use crate::upgrade::{BinaryLocator, StashManager, SystemLocator, UpdateLock};
use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;

/// `ipfs-update stash [--tag T] [--keep]`
#[derive(Args, Debug)]
pub struct StashCommand {
    /// Name for the backup [default: the installed version]
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Copy the binary instead of moving it
    #[arg(short, long)]
    pub keep: bool,
}

impl StashCommand {
    /// Back up the installed binary to `old-bin/ipfs-<tag>`.
    ///
    /// # Errors
    ///
    /// Returns an error if no binary is installed, no tag can be determined, or the
    /// backup cannot be written.
    pub async fn execute(self, config: &UpdateConfig) -> Result<()> {
        let _lock = UpdateLock::acquire(&config.lock_path())?;
        let locator = SystemLocator::new(config);

        let tag = match self.tag {
            Some(tag) => tag,
            None => {
                let current = locator.current_version().await?;
                if current == NO_VERSION {
                    bail!("could not determine the installed version, pass --tag to name the backup");
                }
                current
            }
        };

        let manager = StashManager::new(config);
        let original = manager.stash(locator.find_installed().as_deref(), &tag, self.keep)?;
        println!(
            "{} {} to {}",
            "Stashed".green(),
            original.display(),
            manager.stash_path(&tag).display()
        );
        Ok(())
    }
}
