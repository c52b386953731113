//! Pulling a single executable out of a release archive.
//!
//! Releases ship as `.tar.gz` everywhere except Windows, which gets `.zip`. Only one
//! entry is ever extracted; nothing else in the archive touches the disk.

use crate::core::UpdateError;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::debug;

/// Extract `entry` (e.g. `kubo/ipfs`) from `archive` into the file `dest`.
///
/// The format is chosen from the archive's extension.
///
/// # Errors
///
/// - [`UpdateError::DecodeError`] if the archive cannot be opened or read
/// - [`UpdateError::NoBinaryFound`] if it holds no such entry
pub fn extract_binary(archive: &Path, entry: &str, dest: &Path) -> Result<()> {
    let name = archive.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    debug!("Extracting {} from {}", entry, name);

    if name.ends_with(".zip") {
        extract_from_zip(archive, &name, entry, dest)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_from_tar_gz(archive, &name, entry, dest)
    } else {
        Err(UpdateError::DecodeError {
            archive: name,
            reason: "unknown archive format".to_string(),
        }
        .into())
    }
}

fn decode_error(archive: &str, reason: impl ToString) -> UpdateError {
    UpdateError::DecodeError {
        archive: archive.to_string(),
        reason: reason.to_string(),
    }
}

fn extract_from_tar_gz(archive: &Path, name: &str, entry: &str, dest: &Path) -> Result<()> {
    let file = File::open(archive)
        .with_context(|| format!("Failed to open archive {}", archive.display()))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));

    for item in tar.entries().map_err(|e| decode_error(name, e))? {
        let mut item = item.map_err(|e| decode_error(name, e))?;
        let path = item.path().map_err(|e| decode_error(name, e))?.into_owned();
        let path = path.strip_prefix("./").unwrap_or(&path);

        if path == Path::new(entry) {
            let mut out = File::create(dest)
                .with_context(|| format!("Failed to create {}", dest.display()))?;
            io::copy(&mut item, &mut out).map_err(|e| decode_error(name, e))?;
            return Ok(());
        }
    }

    Err(UpdateError::NoBinaryFound {
        entry: entry.to_string(),
        archive: name.to_string(),
    }
    .into())
}

fn extract_from_zip(archive: &Path, name: &str, entry: &str, dest: &Path) -> Result<()> {
    let file = File::open(archive)
        .with_context(|| format!("Failed to open archive {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| decode_error(name, e))?;

    let mut item = match zip.by_name(entry) {
        Ok(item) => item,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(UpdateError::NoBinaryFound {
                entry: entry.to_string(),
                archive: name.to_string(),
            }
            .into());
        }
        Err(e) => return Err(decode_error(name, e).into()),
    };

    let mut out =
        File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    io::copy(&mut item, &mut out).map_err(|e| decode_error(name, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{build_tar_gz, build_zip};
    use tempfile::TempDir;

    #[test]
    fn test_extract_from_tar_gz() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("kubo_v0.18.1_linux-amd64.tar.gz");
        std::fs::write(
            &archive,
            build_tar_gz(&[("kubo/README.md", b"readme"), ("kubo/ipfs", b"new binary")]),
        )
        .unwrap();

        let dest = temp.path().join("ipfs-new");
        extract_binary(&archive, "kubo/ipfs", &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new binary");
    }

    #[test]
    fn test_extract_from_zip() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("kubo_v0.18.1_windows-amd64.zip");
        std::fs::write(&archive, build_zip(&[("kubo/ipfs.exe", b"windows binary")])).unwrap();

        let dest = temp.path().join("ipfs-new.exe");
        extract_binary(&archive, "kubo/ipfs.exe", &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"windows binary");
    }

    #[test]
    fn test_missing_entry_is_no_binary_found() {
        let temp = TempDir::new().unwrap();
        let tgz = temp.path().join("a.tar.gz");
        std::fs::write(&tgz, build_tar_gz(&[("kubo/README.md", b"readme")])).unwrap();
        let zip = temp.path().join("a.zip");
        std::fs::write(&zip, build_zip(&[("kubo/README.md", b"readme")])).unwrap();

        for archive in [tgz, zip] {
            let err = extract_binary(&archive, "kubo/ipfs", &temp.path().join("out")).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<UpdateError>(),
                Some(UpdateError::NoBinaryFound { .. })
            ));
        }
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let temp = TempDir::new().unwrap();
        for name in ["bad.tar.gz", "bad.zip", "bad.rar"] {
            let archive = temp.path().join(name);
            std::fs::write(&archive, b"this is not an archive").unwrap();

            let err = extract_binary(&archive, "kubo/ipfs", &temp.path().join("out")).unwrap_err();
            assert!(
                matches!(err.downcast_ref::<UpdateError>(), Some(UpdateError::DecodeError { .. })),
                "{name}: {err:#}"
            );
        }
    }
}
