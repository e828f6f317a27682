//! Errors produced by file operations.

use std::io;
use std::path::PathBuf;

use protocol::{OperationStatus, ProtocolError};
use thiserror::Error;

/// Errors that can occur while resolving or operating on files.
#[derive(Debug, Error)]
pub enum FileError {
    /// The request was malformed or unsafe.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The request body exceeded the configured limit.
    #[error("request too large: {0}")]
    TooLarge(String),

    /// The target does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The destination already exists.
    #[error("already exists: {0}")]
    Conflict(String),

    /// The path resolves outside the root, or the OS refused access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other I/O failure.
    #[error("storage failure on {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    /// Outcome kind used on the wire.
    pub fn status(&self) -> OperationStatus {
        match self {
            Self::InvalidInput(_) | Self::TooLarge(_) => OperationStatus::InvalidInput,
            Self::NotFound(_) => OperationStatus::NotFound,
            Self::Conflict(_) => OperationStatus::Conflict,
            Self::PermissionDenied(_) => OperationStatus::PermissionDenied,
            Self::Storage { .. } => OperationStatus::StorageFailure,
        }
    }

    /// Message safe to send to clients.
    ///
    /// Storage failures carry absolute paths and OS detail, so they are
    /// reduced to a generic text.
    pub fn client_message(&self) -> String {
        match self {
            Self::Storage { .. } => "storage failure".to_string(),
            other => other.to_string(),
        }
    }

    /// Classify an I/O error raised while touching `path`.
    ///
    /// `display` is the root-relative name reported to the client; the
    /// absolute path is only kept for storage failures, which are logged
    /// but never echoed.
    pub fn from_io(err: io::Error, path: impl Into<PathBuf>, display: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => {
                Self::NotFound(display.to_string())
            }
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(display.to_string()),
            io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty => {
                Self::Conflict(display.to_string())
            }
            io::ErrorKind::InvalidInput => Self::InvalidInput(display.to_string()),
            _ => Self::Storage {
                path: path.into(),
                source: err,
            },
        }
    }
}

impl From<ProtocolError> for FileError {
    fn from(err: ProtocolError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
