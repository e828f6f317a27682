//! Sandboxed file operations.
//!
//! Everything here works on references relative to one root directory:
//! - [`resolver`] maps references to paths and keeps them inside the root
//! - [`executor`] renames, deletes, uploads and lists
//! - [`upload`] stages uploads and publishes them atomically
//! - [`browser`] reads directory listings
//!
//! # Security
//!
//! References are normalized lexically before touching the filesystem, then
//! parents are canonicalized and checked against the canonical root. Final
//! components are never followed, and symlinks pointing outside the root are
//! refused.

pub mod browser;
pub mod error;
pub mod executor;
pub mod resolver;
pub mod upload;

pub use browser::{list_directory, DirectoryEntry};
pub use error::FileError;
pub use executor::FileExecutor;
pub use resolver::{PathResolver, ResolvedPath};
pub use upload::{sanitize_filename, StagedUpload, UploadBatch, UploadPolicy};
