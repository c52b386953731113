//! Downloading a release and extracting its executable.

use super::archive::extract_binary;
use crate::constants::{DEFAULT_DIST_NAME, KUBO_FIRST_VERSION, LEGACY_DIST_NAME};
use crate::fetch::Fetcher;
use crate::utils::fs::make_executable;
use crate::utils::platform::{archive_ext, exe_name, host_platform};
use crate::version::before_version;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

/// `<dist>_<version>_<os>-<arch>.<ext>`
#[must_use]
pub fn archive_name(dist: &str, version: &str, os: &str, arch: &str) -> String {
    format!("{dist}_{version}_{os}-{arch}.{}", archive_ext(os))
}

/// Distribution that published `version` of the ipfs binary.
///
/// Releases before v0.14.0 live under `go-ipfs`; a configured name other than `kubo`
/// is used as-is.
#[must_use]
pub fn release_dist_name(configured: &str, version: &str) -> String {
    if configured == DEFAULT_DIST_NAME && before_version(KUBO_FIRST_VERSION, version) {
        LEGACY_DIST_NAME.to_string()
    } else {
        configured.to_string()
    }
}

/// Download `<dist>/<version>/<archive>` for this host and write the `binary` inside
/// it to `output`, marked executable.
///
/// The archive itself is kept in a scratch directory that is removed before returning.
///
/// # Errors
///
/// - [`UpdateError::UnsupportedPlatform`](crate::core::UpdateError::UnsupportedPlatform)
///   when no build exists for this host
/// - the fetcher's error (usually a transport error) if the download fails
/// - [`UpdateError::DecodeError`](crate::core::UpdateError::DecodeError) or
///   [`UpdateError::NoBinaryFound`](crate::core::UpdateError::NoBinaryFound) from extraction
pub async fn fetch_binary(
    fetcher: &dyn Fetcher,
    dist: &str,
    version: &str,
    binary: &str,
    output: &Path,
) -> Result<()> {
    let (os, arch) = host_platform()?;
    let archive = archive_name(dist, version, os, arch);
    let path = format!("{dist}/{version}/{archive}");

    info!("Fetching {} {} ({}-{})", dist, version, os, arch);
    let bytes = fetcher.fetch(&path).await?;
    debug!("Downloaded {} bytes from {}", bytes.len(), path);

    let scratch = tempfile::Builder::new()
        .prefix("ipfs-update-archive")
        .tempdir()
        .context("Failed to create scratch directory")?;
    let archive_path = scratch.path().join(&archive);
    tokio::fs::write(&archive_path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", archive_path.display()))?;

    let entry = format!("{dist}/{}", exe_name(binary));
    let output_path = output.to_path_buf();
    tokio::task::spawn_blocking(move || extract_binary(&archive_path, &entry, &output_path))
        .await
        .context("Archive extraction task panicked")??;

    make_executable(output)?;
    Ok(())
}
