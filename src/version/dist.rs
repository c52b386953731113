//! The distribution's list of published versions and symbolic targets.

use super::{normalize_version, parse_tolerant};
use crate::core::UpdateError;
use crate::fetch::Fetcher;
use anyhow::{Context, Result};
use tracing::debug;

/// Published versions of one distribution, newest first, each `v`-prefixed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistVersions {
    versions: Vec<String>,
}

impl DistVersions {
    /// Fetch and parse `<dist>/versions`.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's error, or an error if the listing is not UTF-8.
    pub async fn fetch(fetcher: &dyn Fetcher, dist: &str) -> Result<Self> {
        let path = format!("{dist}/versions");
        let bytes = fetcher.fetch(&path).await?;
        let listing = String::from_utf8(bytes)
            .with_context(|| format!("Version listing {path} is not valid UTF-8"))?;
        Ok(Self::parse(&listing))
    }

    /// Parse a listing with one version per line. Lines that are not versions are skipped.
    #[must_use]
    pub fn parse(listing: &str) -> Self {
        let mut parsed: Vec<(semver::Version, String)> = listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match parse_tolerant(line) {
                Ok(v) => Some((v, normalize_version(line))),
                Err(e) => {
                    debug!("Skipping unparseable version line: {e}");
                    None
                }
            })
            .collect();

        parsed.sort_by(|a, b| b.0.cmp(&a.0));
        parsed.dedup_by(|a, b| a.0 == b.0);

        Self {
            versions: parsed.into_iter().map(|(_, s)| s).collect(),
        }
    }

    /// All versions, newest first.
    #[must_use]
    pub fn all(&self) -> &[String] {
        &self.versions
    }

    /// Newest version, release candidates and dev builds included.
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.versions.first().map(String::as_str)
    }

    /// Newest version without a pre-release tag.
    #[must_use]
    pub fn latest_stable(&self) -> Option<&str> {
        self.versions
            .iter()
            .find(|v| parse_tolerant(v).is_ok_and(|p| p.pre.is_empty()))
            .map(String::as_str)
    }

    /// Whether `version` (in any spelling) is published.
    #[must_use]
    pub fn contains(&self, version: &str) -> bool {
        let wanted = normalize_version(version);
        self.versions.iter().any(|v| *v == wanted)
    }
}

/// Turn what the operator typed into a concrete, normalized version.
///
/// `latest` and `latest-stable` consult the listing of `dist`; anything else is only
/// normalized, without touching the network.
///
/// # Errors
///
/// Returns an error if the listing cannot be fetched or holds no matching version.
pub async fn resolve_target(fetcher: &dyn Fetcher, dist: &str, requested: &str) -> Result<String> {
    let requested = requested.trim();
    let pick: fn(&DistVersions) -> Option<&str> = match requested {
        "latest" => DistVersions::latest,
        "latest-stable" => DistVersions::latest_stable,
        other => return Ok(normalize_version(other)),
    };

    let versions = DistVersions::fetch(fetcher, dist)
        .await
        .with_context(|| format!("Failed to resolve '{requested}'"))?;
    let resolved = pick(&versions).ok_or_else(|| UpdateError::InvalidVersion {
        version: requested.to_string(),
        reason: format!("no matching version published for {dist}"),
    })?;

    debug!("Resolved {} to {}", requested, resolved);
    Ok(resolved.to_string())
}
