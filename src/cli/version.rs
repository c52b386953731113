use crate::config::UpdateConfig;
use crate::version::VersionResolver;
use anyhow::Result;
use clap::Args;

/// `ipfs-update version`
#[derive(Args, Debug)]
pub struct VersionCommand {}

impl VersionCommand {
    /// Print the installed version, or `none`.
    ///
    /// # Errors
    ///
    /// Never fails; a broken install is reported as `none`.
    pub async fn execute(self, config: &UpdateConfig) -> Result<()> {
        println!("{}", VersionResolver::new(config).current_version().await);
        Ok(())
    }
}
