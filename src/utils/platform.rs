//! Platform naming for distribution archives and executables.
//!
//! The distribution names its archives after Go's `GOOS`/`GOARCH` values
//! (`linux-amd64`, `darwin-arm64`, `windows-386`, ...), which differ from Rust's
//! `std::env::consts` spellings.

use crate::core::UpdateError;
use std::path::Path;

/// Append `.exe` on Windows.
///
/// ```rust
/// use ipfs_update::utils::platform::exe_name;
///
/// let name = exe_name("ipfs");
/// if cfg!(windows) {
///     assert_eq!(name, "ipfs.exe");
/// } else {
///     assert_eq!(name, "ipfs");
/// }
/// ```
#[must_use]
pub fn exe_name(name: &str) -> String {
    if cfg!(windows) { format!("{name}.exe") } else { name.to_string() }
}

/// Map a Rust OS name to the distribution's name for it.
#[must_use]
pub fn dist_os_name(os: &str) -> Option<&'static str> {
    match os {
        "linux" => Some("linux"),
        "macos" => Some("darwin"),
        "windows" => Some("windows"),
        "freebsd" => Some("freebsd"),
        "openbsd" => Some("openbsd"),
        "netbsd" => Some("netbsd"),
        _ => None,
    }
}

/// Map a Rust architecture name to the distribution's name for it.
#[must_use]
pub fn dist_arch_name(arch: &str) -> Option<&'static str> {
    match arch {
        "x86_64" => Some("amd64"),
        "x86" => Some("386"),
        "aarch64" => Some("arm64"),
        "arm" => Some("arm"),
        "riscv64" => Some("riscv64"),
        "powerpc64" => Some("ppc64le"),
        _ => None,
    }
}

/// The `<os>-<arch>` pair for the running host.
///
/// # Errors
///
/// Returns [`UpdateError::UnsupportedPlatform`] for hosts the distribution does not build for.
pub fn host_platform() -> Result<(&'static str, &'static str), UpdateError> {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    match (dist_os_name(os), dist_arch_name(arch)) {
        (Some(o), Some(a)) => Ok((o, a)),
        _ => Err(UpdateError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

/// Archive extension used for a distribution OS name.
#[must_use]
pub fn archive_ext(dist_os: &str) -> &'static str {
    if dist_os == "windows" { "zip" } else { "tar.gz" }
}

/// True when `dir` is one of the entries of `PATH`.
#[must_use]
pub fn is_in_path(dir: &Path) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|entry| entry == dir)
}
