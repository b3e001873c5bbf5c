//! Backup error types
//!
//! Every failure the backup tool can report, together with the policy that
//! decides whether it aborts the run immediately or is collected and reported
//! once all stages ran.

use std::path::PathBuf;
use thiserror::Error;

/// How a failure affects the backup run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run right away, releasing the lock of the index in progress
    Abort,
    /// Record the failure, keep going and fail the run after the last stage
    Defer,
}

/// Errors that can occur while talking to searchd or writing a backup
#[derive(Error, Debug)]
pub enum Error {
    /// The searchd config file is unreadable or misses required directives
    #[error("Configuration error: {0}")]
    Config(String),

    /// The daemon answering on the endpoint runs with a different config file
    #[error(
        "Configs mismatched: '{}' <> '{}', make sure the instance you are backing up is using the provided config",
        .expected.display(),
        .actual.display()
    )]
    IdentityMismatch { expected: PathBuf, actual: PathBuf },

    /// The daemon is older than the oldest supported release
    #[error("You are running old version of manticore searchd ({found}), minimum required: {minimum}")]
    Version { found: String, minimum: String },

    /// Control channel unreachable, malformed response or command rejected
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A structural filesystem operation failed
    #[error("Filesystem error at \"{}\": {reason}", .path.display())]
    Filesystem { path: PathBuf, reason: String },

    /// The backup destination for this second is already taken
    #[error("Failed to get destination directory for backup, there is such dir already: {}", .0.display())]
    DestinationExists(PathBuf),

    /// Requested tables do not exist on the daemon
    #[error("You passed unexisting tables: {}", .unknown.join(", "))]
    InvalidArgument { unknown: Vec<String> },

    /// One or more copy steps failed; everything else was attempted
    #[error(
        "Failed to make backup ({}). Please check that the tool has rights to access source and destination directories",
        .failed_steps.join("; ")
    )]
    BackupFailed { failed_steps: Vec<String> },

    /// The run was cancelled by a signal
    #[error("Backup interrupted")]
    Interrupted,

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Filesystem {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// The policy attached to this kind of failure
    pub fn policy(&self) -> FailurePolicy {
        match self {
            Error::BackupFailed { .. } => FailurePolicy::Defer,
            Error::Config(_)
            | Error::IdentityMismatch { .. }
            | Error::Version { .. }
            | Error::Protocol(_)
            | Error::Filesystem { .. }
            | Error::DestinationExists(_)
            | Error::InvalidArgument { .. }
            | Error::Interrupted
            | Error::Io(_)
            | Error::Json(_) => FailurePolicy::Abort,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Error::Protocol(
                "Failed to connect to the manticoresearch daemon. Is it running?".to_string(),
            )
        } else {
            Error::Protocol(err.to_string())
        }
    }
}

/// Result type alias for backup operations
pub type Result<T> = std::result::Result<T, Error>;
