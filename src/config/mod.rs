//! Configuration for ipfs-update.
//!
//! There is a single layer: [`UpdateConfig`], read from `~/.ipfs-update/config.toml`
//! and then adjusted by environment variables and command-line flags. It is never
//! mutated after the CLI hands it to the update machinery.

mod global;

pub use global::{IPFS_DIST_PATH_ENV, IPFS_PATH_ENV, UpdateConfig, normalize_dist_path, user_agent};
