//! Integration test suite for ipfs-update
//!
//! End-to-end tests of the install state machine and the `ipfs-update` binary. The
//! network is replaced by in-memory fetchers or a local HTTP server, and the ipfs
//! binaries by small shell scripts, so the suite runs offline.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **install**: install outcomes, downgrade gate, rollback and cancellation
//! - **revert**: restoring stashed binaries
//! - **cli**: the `ipfs-update` binary's commands and exit codes

mod common;

mod cli;
#[cfg(unix)]
mod install;
#[cfg(unix)]
mod revert;
