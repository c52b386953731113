//! Backups of replaced binaries in `<ipfs_dir>/old-bin`.
//!
//! Before an install overwrites the current executable, a copy is put at
//! `old-bin/ipfs-<version>` and the absolute path it came from is recorded in
//! `old-bin/path-old`. Several backups may coexist; `path-old` always describes the
//! most recent one.
//!
//! All operations are synchronous. [`StashManager::revert`] runs from the install
//! rollback guard's `Drop`, where nothing can be awaited.

use crate::config::UpdateConfig;
use crate::constants::PATH_OLD_FILE;
use crate::core::UpdateError;
use crate::utils::fs::{calculate_checksum, copy_to, make_executable, move_file};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// One backed-up binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashEntry {
    /// Full path inside `old-bin`
    pub path: PathBuf,
    /// File name, e.g. `ipfs-v0.17.0`
    pub name: String,
    /// When the backup was written
    pub modified: DateTime<Local>,
}

/// Creates, lists and restores backups in `old-bin`.
#[derive(Debug, Clone)]
pub struct StashManager {
    old_bin: PathBuf,
    binary_name: String,
}

impl StashManager {
    #[must_use]
    pub fn new(config: &UpdateConfig) -> Self {
        Self {
            old_bin: config.old_bin_dir(),
            binary_name: config.binary_name.clone(),
        }
    }

    /// The backup directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.old_bin
    }

    /// `old-bin/<binary>-<tag>`
    #[must_use]
    pub fn stash_path(&self, tag: &str) -> PathBuf {
        self.old_bin.join(format!("{}-{tag}", self.binary_name))
    }

    /// Back up the installed binary under `tag`.
    ///
    /// `installed` is the binary found on `PATH`. With `keep` it is copied, otherwise
    /// moved. Returns the absolute path it was installed at.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::NoPriorBinary`] when `installed` is `None`
    /// - any I/O error creating `old-bin`, writing `path-old` or copying the binary
    pub fn stash(&self, installed: Option<&Path>, tag: &str, keep: bool) -> Result<PathBuf> {
        let installed = installed.ok_or_else(|| UpdateError::NoPriorBinary {
            binary: self.binary_name.clone(),
        })?;
        let original = std::path::absolute(installed)
            .with_context(|| format!("Failed to resolve absolute path of {}", installed.display()))?;

        debug!("Creating backup directory {}", self.old_bin.display());
        fs::create_dir_all(&self.old_bin).with_context(|| {
            format!("Failed to create backup directory {}", self.old_bin.display())
        })?;
        #[cfg(unix)]
        crate::utils::fs::set_mode(&self.old_bin, crate::constants::OLD_BIN_DIR_MODE)?;

        let path_old = self.old_bin.join(PATH_OLD_FILE);
        debug!("Recording original location in {}", path_old.display());
        fs::write(&path_old, original.to_string_lossy().as_bytes())
            .with_context(|| format!("Failed to write {}", path_old.display()))?;
        #[cfg(unix)]
        crate::utils::fs::set_mode(&path_old, crate::constants::PATH_OLD_MODE)?;

        let backup = self.stash_path(tag);
        if keep {
            info!("Copying {} to {}", original.display(), backup.display());
            copy_to(&original, &backup)?;
        } else {
            info!("Moving {} to {}", original.display(), backup.display());
            move_file(&original, &backup)?;
        }

        Ok(original)
    }

    /// Put `old-bin/ipfs-<version>` back at `install_path`.
    ///
    /// Never fails: when the restore does not work the operator is told where the
    /// backup is and how to move it by hand. Returns whether the restore succeeded.
    pub fn revert(&self, install_path: &Path, version: &str) -> bool {
        let backup = self.stash_path(version);
        info!("Reverting {} from {}", install_path.display(), backup.display());

        match move_file(&backup, install_path) {
            Ok(()) => true,
            Err(e) => {
                error!("failed to replace binary after install fail: {e:#}");
                error!("your old ipfs binary should still be located at {}", backup.display());
                error!("try: `mv {} {}`", backup.display(), install_path.display());
                false
            }
        }
    }

    /// Backups in `old-bin`, sorted by name. `path-old` and directories are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn list(&self) -> Result<Vec<StashEntry>> {
        let read_dir = match fs::read_dir(&self.old_bin) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.old_bin.display()));
            }
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.with_context(|| format!("Failed to read {}", self.old_bin.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = entry.metadata()?;
            if name == PATH_OLD_FILE || !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().map(DateTime::<Local>::from).unwrap_or_default();
            entries.push(StashEntry {
                path: entry.path(),
                name,
                modified,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Pick the backup to revert to.
    ///
    /// A single backup is returned without prompting. With several, they are listed on
    /// `output` and a number is read from `input`; `0` aborts and anything out of range
    /// asks again.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::NoStashFound`] when there are no backups
    /// - [`UpdateError::UserAborted`] when the operator enters `0`
    /// - an I/O error if `input` ends before a valid choice
    pub fn select_for_revert<R: BufRead, W: Write>(
        &self,
        mut input: R,
        mut output: W,
    ) -> Result<PathBuf> {
        let entries = self.list()?;
        match entries.as_slice() {
            [] => {
                return Err(UpdateError::NoStashFound {
                    dir: self.old_bin.display().to_string(),
                }
                .into());
            }
            [only] => return Ok(only.path.clone()),
            _ => {}
        }

        for (i, entry) in entries.iter().enumerate() {
            writeln!(output, "{})\t{}\t{}", i + 1, entry.name, entry.modified.format("%Y-%m-%d %H:%M:%S"))?;
        }
        writeln!(output, "install which? (0 to exit)")?;

        loop {
            output.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                anyhow::bail!("no selection made before end of input");
            }

            match line.trim().parse::<usize>() {
                Ok(0) => return Err(UpdateError::UserAborted.into()),
                Ok(n) if n <= entries.len() => return Ok(entries[n - 1].path.clone()),
                _ => writeln!(
                    output,
                    "please enter a number in the range 1-{} (0 to exit)",
                    entries.len()
                )?,
            }
        }
    }

    /// The path recorded by the most recent stash.
    ///
    /// # Errors
    ///
    /// Returns an error if `path-old` is missing or empty.
    pub fn original_path(&self) -> Result<PathBuf> {
        let path_old = self.old_bin.join(PATH_OLD_FILE);
        let content = fs::read_to_string(&path_old)
            .with_context(|| format!("Failed to read {}", path_old.display()))?;
        let original = content.trim();
        if original.is_empty() {
            anyhow::bail!("{} is empty", path_old.display());
        }
        Ok(PathBuf::from(original))
    }

    /// Install `stash` at the recorded original location and delete it from `old-bin`.
    ///
    /// Returns where it was installed.
    ///
    /// # Errors
    ///
    /// Returns an error if `path-old` cannot be read or the install fails. The backup
    /// is only removed after a successful install.
    pub fn restore(&self, stash: &Path) -> Result<PathBuf> {
        let original = self.original_path()?;
        install_binary(stash, &original)?;

        debug!("Removing consumed backup {}", stash.display());
        fs::remove_file(stash).with_context(|| format!("Failed to remove {}", stash.display()))?;
        Ok(original)
    }
}

/// Copy `src` to `dst`, mark it executable and check the copy is intact.
///
/// # Errors
///
/// Returns [`UpdateError::InstallIo`] if any step fails or the checksums differ.
pub fn install_binary(src: &Path, dst: &Path) -> Result<()> {
    let install_io = |operation: &str, e: &anyhow::Error| UpdateError::InstallIo {
        operation: operation.to_string(),
        path: dst.display().to_string(),
        reason: format!("{e:#}"),
    };

    info!("Installing {} to {}", src.display(), dst.display());
    copy_to(src, dst).map_err(|e| install_io("copy binary to", &e))?;
    make_executable(dst).map_err(|e| install_io("set permissions on", &e))?;

    let expected = calculate_checksum(src).map_err(|e| install_io("checksum", &e))?;
    let actual = calculate_checksum(dst).map_err(|e| install_io("checksum", &e))?;
    if expected != actual {
        return Err(UpdateError::InstallIo {
            operation: "verify".to_string(),
            path: dst.display().to_string(),
            reason: format!("checksum mismatch: expected {expected}, got {actual}"),
        }
        .into());
    }
    Ok(())
}
