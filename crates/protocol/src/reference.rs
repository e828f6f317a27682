//! Root-relative file references.
//!
//! A [`FileReference`] is the only way a client names a file. It is checked
//! lexically when it is constructed or deserialized: it must be relative,
//! non-empty, and its `..` segments may never climb above the root. Whether
//! the target exists, or whether symlinks keep it inside the root, is decided
//! later by the daemon against the real filesystem.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Separator used in file references regardless of host platform.
pub const SEPARATOR: char = '/';

/// A validated, root-relative path to a file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileReference(String);

impl FileReference {
    /// Parse and validate a reference.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        normalize(&raw)?;
        Ok(Self(raw))
    }

    /// The reference exactly as the client sent it.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalized segments with `.` dropped and `..` applied.
    ///
    /// An empty vector denotes the root itself.
    pub fn segments(&self) -> Vec<&str> {
        // Validated on construction.
        normalize(&self.0).unwrap_or_default()
    }

    /// Whether the reference resolves to the root directory.
    pub fn is_root(&self) -> bool {
        self.segments().is_empty()
    }

    /// The normalized reference joined with `/`.
    pub fn normalized(&self) -> String {
        self.segments().join("/")
    }

    /// The final segment, if the reference is not the root.
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last().copied()
    }
}

fn normalize(raw: &str) -> Result<Vec<&str>> {
    if raw.is_empty() {
        return Err(ProtocolError::EmptyReference);
    }

    if let Some(c) = raw.chars().find(|c| *c == '\0' || *c == '\\') {
        return Err(ProtocolError::ForbiddenCharacter(c));
    }

    if raw.starts_with(SEPARATOR) || has_drive_prefix(raw) {
        return Err(ProtocolError::AbsoluteReference(raw.to_string()));
    }

    let mut segments = Vec::new();
    for segment in raw.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(ProtocolError::EscapesRoot(raw.to_string()));
                }
            }
            name => segments.push(name),
        }
    }

    Ok(segments)
}

/// `C:` or `C:/...`; a colon later in the name (`a:notes.txt`) is a plain
/// POSIX file name.
fn has_drive_prefix(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'/')
}

impl fmt::Display for FileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FileReference {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for FileReference {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<FileReference> for String {
    fn from(reference: FileReference) -> Self {
        reference.0
    }
}

impl AsRef<str> for FileReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
