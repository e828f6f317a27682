//! Request and response payloads for the file manager endpoints.
//!
//! All bodies are JSON. Single-target requests carry [`FileReference`]s, so a payload with
//! an unsafe path fails to deserialize before any handler runs.

use serde::{Deserialize, Serialize};

use crate::reference::FileReference;

// =============================================================================
// Outcomes
// =============================================================================

/// Outcome kind of a file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// The operation completed.
    Success,
    /// The target does not exist.
    NotFound,
    /// The destination already exists.
    Conflict,
    /// The target is outside what the daemon may touch.
    PermissionDenied,
    /// The request was malformed or unsafe.
    InvalidInput,
    /// The underlying filesystem failed.
    StorageFailure,
}

impl OperationStatus {
    /// Whether this is [`OperationStatus::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Stable snake_case name, as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidInput => "invalid_input",
            Self::StorageFailure => "storage_failure",
        }
    }
}

/// Result of a single file operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Outcome kind.
    pub status: OperationStatus,
    /// Human readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Path the result applies to, relative to the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl OperationResult {
    /// Create a result with the given status and message.
    pub fn new(status: OperationStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            path: None,
        }
    }

    /// Create a successful result.
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(OperationStatus::Success, message)
    }

    /// Attach the affected path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

// =============================================================================
// Rename / Delete
// =============================================================================

/// Body of `POST {base}/renameFile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRequest {
    /// Existing file or directory.
    pub old_path: FileReference,
    /// New location.
    pub new_path: FileReference,
    /// Replace an existing destination.
    #[serde(default)]
    pub overwrite: bool,
}

/// Body of `POST {base}/deleteFile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// File or directory to delete.
    pub path: FileReference,
}

// =============================================================================
// Bulk delete
// =============================================================================

/// Body of `POST {base}/bulkDelete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteRequest {
    /// References to delete, processed in order.
    ///
    /// Kept as raw strings: an invalid entry fails on its own instead of
    /// rejecting the whole batch.
    pub paths: Vec<String>,
}

/// A bulk item that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    /// Reference as sent by the client.
    pub path: String,
    /// Why it failed.
    pub status: OperationStatus,
    /// Detail.
    pub message: String,
}

/// Response of `POST {base}/bulkDelete`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BulkDeleteResponse {
    /// `success` when every item was deleted, `partial` otherwise.
    pub status: BulkStatus,
    /// References that were deleted.
    pub deleted: Vec<String>,
    /// References that failed, with the reason.
    pub failures: Vec<BulkFailure>,
    /// References never attempted because processing stopped early.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

/// Aggregate status of a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkStatus {
    /// All items succeeded.
    #[default]
    Success,
    /// At least one item failed or was skipped.
    Partial,
}

// =============================================================================
// Upload
// =============================================================================

/// Query string of `POST {base}/uploadFiles`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UploadQuery {
    /// Destination directory; the root when absent.
    #[serde(default)]
    pub path: Option<String>,
    /// Replace files that already exist.
    #[serde(default)]
    pub overwrite: bool,
}

/// A file written by an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Sanitized file name.
    pub name: String,
    /// Path relative to the root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Hex-encoded SHA-256 of the content.
    pub sha256: String,
}

/// Response of `POST {base}/uploadFiles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Always [`OperationStatus::Success`]; failures use the error body.
    pub status: OperationStatus,
    /// Files published by this upload.
    pub files: Vec<UploadedFile>,
}

// =============================================================================
// Listing
// =============================================================================

/// Query string of `GET {base}/`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListQuery {
    /// Directory to list; the root when absent.
    #[serde(default)]
    pub path: Option<String>,
    /// Include entries whose name starts with `.`.
    #[serde(default)]
    pub include_hidden: bool,
}

/// Response of `GET {base}/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    /// Listed directory relative to the root (`""` for the root).
    pub path: String,
    /// Directory entries.
    pub entries: Vec<FileEntry>,
}

/// A single file or directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub entry_type: FileEntryType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Unix permissions mode.
    pub mode: u32,
    /// Last modified timestamp (Unix epoch seconds).
    pub modified: u64,
}

/// Type of file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEntryType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Other (device, socket, etc.).
    Other,
}

// =============================================================================
// Home
// =============================================================================

/// Response of `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name.
    pub name: String,
    /// Service version.
    pub version: String,
    /// Routes served, in registration order.
    pub routes: Vec<RouteInfo>,
}

/// One entry of the route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// HTTP method.
    pub method: String,
    /// Absolute path.
    pub path: String,
}

/// Body returned for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Failure kind.
    pub status: OperationStatus,
    /// Detail.
    pub message: String,
}
