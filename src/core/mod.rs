//! Core types shared by every part of ipfs-update.
//!
//! Right now that is the error taxonomy and its user-facing rendering; see
//! [`error`] for details.

pub mod error;

pub use error::{ErrorContext, UpdateError, user_friendly_error};
