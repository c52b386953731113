//! Version strings: normalization, ordering and feature gates.
//!
//! ipfs versions appear in several spellings: `0.18.1` from `ipfs version -n`,
//! `v0.18.1` in the distribution, `0.4` in very old listings, `v0.5.0-rc1` for release
//! candidates. Everything the updater compares goes through [`normalize_version`] first
//! and is ordered with a tolerant semantic-version parse.
//!
//! # Examples
//!
//! ```rust
//! use ipfs_update::version::{before_version, compare_versions, normalize_version};
//! use std::cmp::Ordering;
//!
//! assert_eq!(normalize_version("0.9.0"), "v0.9.0");
//! assert_eq!(compare_versions("v0.5.0-rc1", "v0.5.0").unwrap(), Ordering::Less);
//! assert!(before_version("v0.3.10", "v0.3.9"));
//! ```

pub mod current;
pub mod dist;

pub use current::{VersionResolver, binary_version};
pub use dist::{DistVersions, resolve_target};

use crate::core::UpdateError;
use semver::Version;
use std::cmp::Ordering;

/// Prefix `v` onto a dotted numeric version.
///
/// The prefix is added only when the string does not already start with `v` and has at
/// least three dot-separated components whose first is numeric. Anything else,
/// including symbolic names like `latest` and the `none` sentinel, is returned as-is.
#[must_use]
pub fn normalize_version(version: &str) -> String {
    let version = version.trim();
    if version.starts_with('v') {
        return version.to_string();
    }

    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() >= 3 && parts[0].parse::<u64>().is_ok() {
        format!("v{version}")
    } else {
        version.to_string()
    }
}

/// Parse a version leniently.
///
/// Accepts a leading `v`, missing minor/patch components (`0.4` is `0.4.0`) and leading
/// zeros. Pre-release and build metadata follow normal semver rules.
///
/// # Errors
///
/// Returns [`UpdateError::InvalidVersion`] when the numeric part is malformed.
pub fn parse_tolerant(version: &str) -> Result<Version, UpdateError> {
    let invalid = |reason: &str| UpdateError::InvalidVersion {
        version: version.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);

    let parts: Vec<&str> = core.split('.').collect();
    if core.is_empty() || parts.len() > 3 {
        return Err(invalid("expected MAJOR[.MINOR[.PATCH]]"));
    }

    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part.parse().map_err(|_| invalid("version components must be numeric"))?;
    }

    let canonical = format!("{}.{}.{}{suffix}", numbers[0], numbers[1], numbers[2]);
    Version::parse(&canonical).map_err(|e| invalid(&e.to_string()))
}

/// Order two versions semantically; pre-releases sort before their release.
///
/// # Errors
///
/// Returns [`UpdateError::InvalidVersion`] if either side does not parse.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, UpdateError> {
    Ok(parse_tolerant(a)?.cmp(&parse_tolerant(b)?))
}

/// True when `current` is strictly older than `check`, looking only at major, minor and
/// patch.
///
/// Used for feature gates such as "binaries before v0.3.10 cannot report their repo
/// version". Unparseable input is never considered older.
#[must_use]
pub fn before_version(check: &str, current: &str) -> bool {
    match (parse_tolerant(check), parse_tolerant(current)) {
        (Ok(check), Ok(current)) => {
            (current.major, current.minor, current.patch) < (check.major, check.minor, check.patch)
        }
        _ => false,
    }
}

/// Does the version a binary reports match the one that was requested?
///
/// Development builds report themselves as `-pre` while being published as `-dev`, so a
/// `-dev` expectation is satisfied by a `-pre` binary with the same base version.
#[must_use]
pub fn version_match(reported: &str, expected: &str) -> bool {
    let reported = reported.trim().trim_start_matches('v');
    let expected = expected.trim().trim_start_matches('v');

    if expected.ends_with("-dev") && reported.contains("-pre") {
        return reported.split('-').next() == expected.split('-').next();
    }
    reported == expected
}
