use crate::config::UpdateConfig;
use crate::fetch::default_fetcher;
use crate::version::DistVersions;
use anyhow::Result;
use clap::Args;

/// `ipfs-update versions`
#[derive(Args, Debug)]
pub struct VersionsCommand {}

impl VersionsCommand {
    /// Print the published versions, oldest first, one per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be fetched.
    pub async fn execute(self, config: &UpdateConfig) -> Result<()> {
        let fetcher = default_fetcher(config)?;
        let versions = DistVersions::fetch(fetcher.as_ref(), &config.dist_name).await;
        fetcher.close().await?;

        for version in versions?.all().iter().rev() {
            println!("{version}");
        }
        Ok(())
    }
}
