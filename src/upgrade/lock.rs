//! Exclusive lock keeping two updater runs away from the same ipfs directory.
//!
//! The lock is an OS-level file lock (via `fs4`) on `<ipfs_dir>/ipfs-update.lock`.
//! Acquisition never waits: a second process fails immediately with
//! [`UpdateError::LockBusy`]. The lock is released on drop; the file itself stays, so
//! every run locks the same inode.

use crate::core::UpdateError;
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held for the duration of an install, stash or revert.
#[derive(Debug)]
pub struct UpdateLock {
    file: File,
    path: PathBuf,
}

impl UpdateLock {
    /// Take the lock at `path`, creating its parent directory if needed.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::LockBusy`] if another process holds it
    /// - an I/O error if the lock file cannot be created
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(true) => {
                debug!(path = %path.display(), "Update lock acquired");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Ok(false) => Err(UpdateError::LockBusy {
                path: path.display().to_string(),
            }
            .into()),
            Err(e) => Err(e).with_context(|| format!("Failed to lock {}", path.display())),
        }
    }

    /// Location of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(error = %e, "Failed to unlock {}", self.path.display());
        }
        debug!(path = %self.path.display(), "Update lock released");
    }
}
