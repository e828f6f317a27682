//! Error types for the protocol crate.

use thiserror::Error;

/// Errors raised while validating wire values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A file reference was empty.
    #[error("file reference is empty")]
    EmptyReference,

    /// A file reference was an absolute path.
    #[error("file reference must be relative: {0}")]
    AbsoluteReference(String),

    /// A file reference contained a forbidden character.
    #[error("file reference contains a forbidden character: {0:?}")]
    ForbiddenCharacter(char),

    /// A file reference climbs above the managed root.
    #[error("file reference escapes the root: {0}")]
    EscapesRoot(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
