//! Constants used throughout ipfs-update.
//!
//! Timeouts, retry parameters, size limits and the on-disk names the updater
//! shares with the ipfs repository layout.

use std::time::Duration;

/// Maximum backoff delay for exponential backoff (500ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for exponential backoff (10ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Maximum number of bytes read from a single fetch (512 MiB).
///
/// Anything past this is silently truncated; a truncated archive then fails to decode.
pub const DEFAULT_FETCH_LIMIT: u64 = 512 * 1024 * 1024;

/// Bytes of an error response body kept for the error message.
pub const ERROR_BODY_LIMIT: u64 = 4 * 1024;

/// Attempts made by the retry fetcher before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default distribution root, resolved through IPNS.
pub const DEFAULT_DIST_PATH: &str = "/ipns/dist.ipfs.tech";

/// Public gateway used by the HTTP fetcher.
pub const DEFAULT_GATEWAY_URL: &str = "https://ipfs.io";

/// Local node API used when the repo has no `api` file.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5001";

/// Distribution whose `versions` listing is consulted.
pub const DEFAULT_DIST_NAME: &str = "kubo";

/// Distribution name used before the rename to kubo.
pub const LEGACY_DIST_NAME: &str = "go-ipfs";

/// First release published under the kubo name.
pub const KUBO_FIRST_VERSION: &str = "v0.14.0";

/// Name of the managed executable (without platform suffix).
pub const DEFAULT_BINARY_NAME: &str = "ipfs";

/// Distribution and binary name of the repo migration tool.
pub const MIGRATIONS_DIST_NAME: &str = "fs-repo-migrations";

/// Backup directory inside the ipfs dir.
pub const OLD_BIN_DIR: &str = "old-bin";

/// File inside [`OLD_BIN_DIR`] recording where the stashed binary came from.
pub const PATH_OLD_FILE: &str = "path-old";

/// Directory inside the ipfs dir where new binaries are smoke tested.
pub const STAGING_DIR: &str = "update-staging";

/// Marker for a sentinel "no version installed".
pub const NO_VERSION: &str = "none";

/// Targets older than this cannot report the repo version they expect.
pub const MIGRATION_CHECK_MIN_VERSION: &str = "v0.3.10";

/// Targets older than this are only checked with `init` and `version`.
pub const DAEMON_CHECK_MIN_VERSION: &str = "v0.3.8";

/// Timeout for probing the local node API.
pub const API_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on the whole verification run.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(300);

/// Polls of the staging repo for the daemon's `api` file.
pub const API_FILE_POLL_ATTEMPTS: u32 = 15;

/// Base delay between `api` file polls; multiplied by the attempt number.
pub const API_FILE_POLL_DELAY_MS: u64 = 100;

/// TCP connection attempts against the daemon's API before giving up.
pub const API_DIAL_ATTEMPTS: usize = 10;

/// Mode given to installed binaries.
#[cfg(unix)]
pub const BINARY_MODE: u32 = 0o755;

/// Mode for the backup directory.
#[cfg(unix)]
pub const OLD_BIN_DIR_MODE: u32 = 0o700;

/// Mode for `path-old`.
#[cfg(unix)]
pub const PATH_OLD_MODE: u32 = 0o644;
