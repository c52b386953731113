use crate::config::UpdateConfig;
use crate::fetch::default_fetcher;
use crate::upgrade::acquire::{fetch_binary, release_dist_name};
use crate::version::resolve_target;
use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

/// `ipfs-update fetch [version] [--output path]`
#[derive(Args, Debug)]
pub struct FetchCommand {
    /// Version to download: vX.Y.Z, latest or latest-stable
    #[arg(value_name = "VERSION", default_value = "latest")]
    pub version: String,

    /// Where to save the binary [default: ./ipfs-<version>]
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

impl FetchCommand {
    /// Download and extract the binary for this platform. It is not tested.
    ///
    /// # Errors
    ///
    /// Returns an error if the output already exists or the download fails.
    pub async fn execute(self, config: &UpdateConfig) -> Result<()> {
        let fetcher = default_fetcher(config)?;
        let result = async {
            let version = resolve_target(fetcher.as_ref(), &config.dist_name, &self.version).await?;
            let output = self
                .output
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("{}-{version}", config.binary_name)));
            if output.exists() {
                bail!("file named {} already exists", output.display());
            }

            let dist = release_dist_name(&config.dist_name, &version);
            fetch_binary(fetcher.as_ref(), &dist, &version, &config.binary_name, &output).await?;
            Ok((version, output))
        }
        .await;
        fetcher.close().await?;

        let (version, output) = result?;
        println!("{} {} to {}", "Fetched".green(), version.bold(), output.display());
        Ok(())
    }
}
