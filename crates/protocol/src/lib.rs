//! # Filemgr Protocol Library
//!
//! Wire types shared between the file manager daemon and its clients.
//!
//! ## Overview
//!
//! - **File references**: validated, root-relative identifiers for files and
//!   directories ([`FileReference`])
//! - **Outcomes**: the tagged result of every file operation
//!   ([`OperationStatus`], [`OperationResult`])
//! - **Payloads**: JSON request and response bodies for each endpoint
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{FileReference, OperationResult};
//! use protocol::messages::RenameRequest;
//!
//! let request = RenameRequest {
//!     old_path: FileReference::new("docs/draft.txt").unwrap(),
//!     new_path: FileReference::new("docs/final.txt").unwrap(),
//!     overwrite: false,
//! };
//! let json = serde_json::to_string(&request).unwrap();
//! assert!(json.contains("docs/final.txt"));
//!
//! let ok = OperationResult::success("renamed");
//! assert!(ok.status.is_success());
//! ```
//!
//! ## Modules
//!
//! - [`reference`]: `FileReference` parsing and normalisation
//! - [`messages`]: request/response payloads and outcome types
//! - [`error`]: Error types

pub mod error;
pub mod messages;
pub mod reference;

pub use error::{ProtocolError, Result};
pub use messages::{FileEntry, FileEntryType, OperationResult, OperationStatus};
pub use reference::FileReference;
