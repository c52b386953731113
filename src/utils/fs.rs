//! Filesystem helpers for moving executables around.
//!
//! These are synchronous so they can run from `Drop`, where the install rollback
//! lives. Binaries are small enough that blocking briefly is fine.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Copy `src` to `dst`, replacing whatever is at `dst`.
///
/// On Windows a running executable cannot be overwritten, so the destination is
/// removed (or moved aside, see [`force_remove`]) first.
///
/// # Errors
///
/// Returns an error if the destination cannot be cleared or the copy fails.
pub fn copy_to(src: &Path, dst: &Path) -> Result<()> {
    if cfg!(windows) && dst.exists() {
        force_remove(dst)?;
    }

    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Move a file: copy, then remove the source.
///
/// Works across filesystems; the backup dir is often on a different mount than
/// `/usr/local/bin`.
///
/// # Errors
///
/// Returns an error if the copy or the removal of `src` fails.
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    copy_to(src, dst)?;
    force_remove(src)
}

/// Remove a file, tolerating an in-use executable on Windows.
///
/// Windows refuses to delete a running binary but allows renaming it, so when removal
/// fails there the file is moved into the temp directory under a timestamped name.
///
/// # Errors
///
/// Returns an error if the file can be neither removed nor moved aside.
pub fn force_remove(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) if cfg!(windows) => {
            let parked = parked_path(path);
            debug!("Could not remove {:?} ({e}), moving it to {:?}", path, parked);
            fs::rename(path, &parked)
                .with_context(|| format!("Failed to move {} out of the way", path.display()))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

fn parked_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    std::env::temp_dir().join(format!("{}-{}", chrono::Utc::now().format("%Y%m%d%H%M%S%f"), name))
}

/// Set the executable mode bits (no-op on Windows).
///
/// # Errors
///
/// Returns an error if the permissions cannot be changed.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to chmod {:o} {}", mode, path.display()))
}

/// Mark a file executable for everyone (0755).
///
/// # Errors
///
/// Returns an error if the permissions cannot be changed.
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        set_mode(path, crate::constants::BINARY_MODE)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// True if a file can be created in `dir`.
#[must_use]
pub fn can_write(dir: &Path) -> bool {
    tempfile::Builder::new().prefix(".ipfs-update-test").tempfile_in(dir).is_ok()
}

/// Hex-encoded SHA-256 of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn calculate_checksum(path: &Path) -> Result<String> {
    let content = fs::read(path)
        .with_context(|| format!("Failed to read file for checksum: {}", path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize()))
}
