//! Shared setup for the integration tests.

// Not every helper is used by every test module
#![allow(dead_code)]

use ipfs_update::config::UpdateConfig;
use ipfs_update::test_utils::{StaticFetcher, release_archive, release_path};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A scratch ipfs dir and a `bin/` directory for the managed binary.
pub struct Sandbox {
    pub temp: TempDir,
    pub config: UpdateConfig,
}

impl Sandbox {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let config = UpdateConfig::default().with_ipfs_dir(temp.path().join("ipfs"));
        std::fs::create_dir_all(temp.path().join("bin")).expect("create bin dir");
        std::fs::create_dir_all(&config.ipfs_dir).expect("create ipfs dir");
        Self { temp, config }
    }

    /// Like [`Sandbox::new`], but the ipfs dir is left uncreated.
    pub fn without_ipfs_dir() -> Self {
        let sandbox = Self::new();
        std::fs::remove_dir(&sandbox.config.ipfs_dir).expect("remove ipfs dir");
        sandbox
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.temp.path().join("bin")
    }

    pub fn installed_path(&self) -> PathBuf {
        self.bin_dir().join(self.config.exe_name())
    }

    pub fn set_repo_version(&self, version: u32) {
        std::fs::write(self.config.repo_version_file(), format!("{version}\n")).expect("write repo version");
    }

    pub fn old_bin_entries(&self) -> Vec<String> {
        std::fs::read_dir(self.config.old_bin_dir())
            .map(|entries| {
                let mut names: Vec<String> = entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                names
            })
            .unwrap_or_default()
    }
}

/// Script body for a fake ipfs that reports `version` and repo `repo`.
pub fn fake_ipfs(version: &str, repo: u32) -> String {
    format!(
        "#!/bin/sh\n\
         if [ \"$1\" = version ] && [ \"$2\" = --repo ]; then echo {repo}; exit 0; fi\n\
         if [ \"$1\" = version ]; then echo \"ipfs version {version}\"; exit 0; fi\n\
         exit 0\n",
        version = version.trim_start_matches('v'),
    )
}

/// A fetcher serving the kubo release `version` whose binary is `content`.
pub fn release_fetcher(version: &str, content: &str) -> Arc<StaticFetcher> {
    Arc::new(
        StaticFetcher::new()
            .with_file(&release_path("kubo", version), release_archive("kubo", "ipfs", content.as_bytes())),
    )
}

/// Install [`fake_ipfs`] at `path`.
#[cfg(unix)]
pub fn write_fake_ipfs(path: &Path, version: &str, repo: u32) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, fake_ipfs(version, repo)).expect("write fake ipfs");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).expect("chmod fake ipfs");
}

pub fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}
