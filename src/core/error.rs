//! Error handling for ipfs-update
//!
//! The error system follows two rules:
//! 1. **Strongly-typed errors** so the update orchestrator can tell soft conditions
//!    (a missing prior binary, an unanswerable migration query) from hard ones
//! 2. **User-friendly messages** with actionable suggestions for the command line
//!
//! # Architecture
//!
//! - [`UpdateError`] - every failure mode the updater distinguishes
//! - [`ErrorContext`] - wrapper adding details and a suggestion for display
//!
//! Library code returns [`anyhow::Result`] and raises [`UpdateError`] values where the
//! caller needs to react to the kind of failure. Because `anyhow` preserves the typed
//! error through `.context()` layers, callers recover it with
//! `err.downcast_ref::<UpdateError>()`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ipfs_update::core::{UpdateError, user_friendly_error};
//!
//! let err = anyhow::Error::new(UpdateError::DowngradeRefused {
//!     current: "v0.20.0".to_string(),
//!     target: "v0.18.1".to_string(),
//! });
//!
//! match err.downcast_ref::<UpdateError>() {
//!     Some(UpdateError::DowngradeRefused { .. }) => user_friendly_error(err).display(),
//!     _ => {}
//! }
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The error type for update operations.
///
/// Variants carry plain strings so the error can be cloned into an
/// [`ErrorContext`] after being recovered from an [`anyhow::Error`].
///
/// # Severity
///
/// The orchestrator treats [`NoPriorBinary`] and [`MigrationQueryFailed`] as soft:
/// they are logged and the update continues. Everything else raised after the stash
/// step triggers a rollback before it is surfaced.
///
/// [`NoPriorBinary`]: UpdateError::NoPriorBinary
/// [`MigrationQueryFailed`]: UpdateError::MigrationQueryFailed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// A fetch failed at the transport level (connection, HTTP status, API error).
    ///
    /// The retry fetcher retries these (and untyped errors); any other
    /// [`UpdateError`] ends the attempt series at once.
    #[error("Failed to fetch {path}: {reason}")]
    TransportError {
        /// Logical distribution path that was requested
        path: String,
        /// What the transport reported
        reason: String,
    },

    /// The retry fetcher gave up; the last underlying error is attached as its source.
    #[error("exceeded number of retries ({attempts} attempts)")]
    RetriesExceeded {
        /// How many attempts were made
        attempts: u32,
    },

    /// The downloaded archive could not be opened or read.
    #[error("Failed to decode archive {archive}: {reason}")]
    DecodeError {
        /// Archive file name
        archive: String,
        /// Decoder error message
        reason: String,
    },

    /// The archive was readable but did not contain the expected executable.
    #[error("No binary found in archive {archive} (expected entry '{entry}')")]
    NoBinaryFound {
        /// Entry path that was searched for
        entry: String,
        /// Archive file name
        archive: String,
    },

    /// There is no installed binary to stash.
    #[error("could not find old binary '{binary}' on PATH")]
    NoPriorBinary {
        /// Executable name that was looked up
        binary: String,
    },

    /// The backup directory holds nothing to revert to.
    #[error("no prior binary found at: {dir}")]
    NoStashFound {
        /// The backup directory that was inspected
        dir: String,
    },

    /// The target is older than the installed version and downgrades were not allowed.
    #[error("refusing to downgrade from {current} to {target}")]
    DowngradeRefused {
        /// Installed version
        current: String,
        /// Requested version
        target: String,
    },

    /// The new binary failed its smoke test.
    #[error("new binary for {version} failed verification: {reason}")]
    VerificationFailed {
        /// Version that was being verified
        version: String,
        /// What went wrong
        reason: String,
    },

    /// The new binary could not report the repository version it expects.
    #[error("could not determine the repo version expected by the new binary: {reason}")]
    MigrationQueryFailed {
        /// What went wrong
        reason: String,
    },

    /// The external migration runner failed.
    #[error("repo migration to version {target} failed: {reason}")]
    MigrationRunFailed {
        /// Repository version the migration was heading for
        target: u32,
        /// What went wrong
        reason: String,
    },

    /// Copying, moving or chmod-ing a binary failed.
    #[error("Failed to {operation} {path}: {reason}")]
    InstallIo {
        /// The filesystem operation, e.g. "copy binary to"
        operation: String,
        /// Path involved
        path: String,
        /// Underlying error message
        reason: String,
    },

    /// A version string could not be interpreted.
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion {
        /// The offending version string
        version: String,
        /// Why it was rejected
        reason: String,
    },

    /// Another ipfs-update process holds the backup lock.
    #[error("another ipfs-update process is running (lock held at {path})")]
    LockBusy {
        /// Lock file path
        path: String,
    },

    /// The operator cancelled the operation (Ctrl-C).
    #[error("operation cancelled during {stage}")]
    Cancelled {
        /// Step that was in progress
        stage: String,
    },

    /// The operator chose to exit at an interactive prompt.
    #[error("exiting at user request")]
    UserAborted,

    /// No distribution archive exists for this platform.
    #[error("Unsupported platform: {os}-{arch}")]
    UnsupportedPlatform {
        /// Operating system name
        os: String,
        /// CPU architecture name
        arch: String,
    },

    /// Configuration file problem.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the problem
        message: String,
    },

    /// Anything else.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl UpdateError {
    /// True for conditions the orchestrator logs and moves past.
    #[must_use]
    pub const fn is_soft(&self) -> bool {
        matches!(self, Self::NoPriorBinary { .. } | Self::MigrationQueryFailed { .. })
    }

    /// True for failures worth another fetch attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportError { .. })
    }
}

/// An [`UpdateError`] plus optional details and suggestion for terminal display.
///
/// ```rust,no_run
/// use ipfs_update::core::{ErrorContext, UpdateError};
///
/// let context = ErrorContext::new(UpdateError::UserAborted)
///     .with_details("No binary was changed");
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdateError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error (shown in green).
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error (shown in yellow).
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error, details and suggestion to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] suitable for showing to the operator.
///
/// Known [`UpdateError`] variants get tailored suggestions. The rest of the
/// `anyhow` chain is kept in the details so transport failures behind a retry or
/// multi fetcher are still visible.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let causes = cause_chain(&error);

    if let Some(update_error) = error.downcast_ref::<UpdateError>() {
        let ctx = create_error_context(update_error.clone());
        return match causes {
            Some(chain) if ctx.details.is_none() => ctx.with_details(chain),
            _ => ctx,
        };
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::PermissionDenied {
            return ErrorContext::new(UpdateError::Other {
                message: error.to_string(),
            })
            .with_suggestion(
                "Re-run with permission to write the install directory (for example with sudo)",
            )
            .with_details("The current user cannot write one of the files ipfs-update manages");
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(UpdateError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax in ~/.ipfs-update/config.toml");
    }

    let mut message = error.to_string();
    if let Some(chain) = causes {
        message.push_str("\n\n");
        message.push_str(&chain);
    }
    ErrorContext::new(UpdateError::Other {
        message,
    })
}

fn cause_chain(error: &anyhow::Error) -> Option<String> {
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if chain.is_empty() {
        return None;
    }

    let mut message = String::from("Caused by:");
    for (i, cause) in chain.iter().enumerate() {
        message.push_str(&format!("\n  {}: {}", i + 1, cause));
    }
    Some(message)
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::TransportError { .. } | UpdateError::RetriesExceeded { .. } => {
            ErrorContext::new(error).with_suggestion(
                "Check your network connection, or start a local ipfs daemon so the API fetcher can be used",
            )
        }
        UpdateError::DowngradeRefused { .. } => ErrorContext::new(error).with_suggestion(
            "In order to downgrade, pass the --allow-downgrade flag or use `ipfs-update revert`",
        ),
        UpdateError::VerificationFailed { .. } => ErrorContext::new(error)
            .with_details("The installed binary was left untouched")
            .with_suggestion("Pass --no-check to skip the smoke test if you trust this build"),
        UpdateError::MigrationRunFailed { .. } => ErrorContext::new(error)
            .with_details("The previous binary has been restored")
            .with_suggestion("Run fs-repo-migrations manually, then retry the install"),
        UpdateError::NoStashFound { .. } => ErrorContext::new(error)
            .with_suggestion("A binary is stashed automatically on install, or with `ipfs-update stash`"),
        UpdateError::NoPriorBinary { .. } => ErrorContext::new(error)
            .with_suggestion("Make sure ipfs is on your PATH"),
        UpdateError::LockBusy { .. } => ErrorContext::new(error)
            .with_suggestion("Wait for the other ipfs-update process to finish"),
        UpdateError::InstallIo { .. } => ErrorContext::new(error)
            .with_suggestion("Check permissions on the install directory, or re-run with sudo"),
        UpdateError::UnsupportedPlatform { .. } => ErrorContext::new(error)
            .with_details("The distribution does not publish builds for this platform"),
        UpdateError::ConfigError { .. } => ErrorContext::new(error)
            .with_suggestion("Check the TOML syntax in ~/.ipfs-update/config.toml"),
        _ => ErrorContext::new(error),
    }
}
