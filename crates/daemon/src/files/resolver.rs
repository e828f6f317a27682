//! Mapping of file references onto the managed root.
//!
//! References are already lexically safe (see [`FileReference`]). This module
//! checks the real filesystem: every directory above the target is
//! canonicalized and must stay under the root, and a final component that is
//! a symlink must not point outside it. The final component itself is never
//! followed, so operations act on a link rather than on its target.

use std::fs;
use std::path::{Path, PathBuf};

use protocol::FileReference;
use tracing::debug;

use super::error::FileError;

/// A reference resolved to an absolute path under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Normalized root-relative reference (`""` for the root).
    pub reference: String,
    /// Absolute path; parents are canonical, the final component is not followed.
    pub path: PathBuf,
}

impl ResolvedPath {
    /// Whether this is the root directory.
    pub fn is_root(&self) -> bool {
        self.reference.is_empty()
    }

    /// Metadata of the entry itself, without following a final symlink.
    pub fn metadata(&self) -> Result<fs::Metadata, FileError> {
        fs::symlink_metadata(&self.path).map_err(|e| self.io_error(e))
    }

    /// Whether anything (including a dangling symlink) exists at the path.
    pub fn exists(&self) -> bool {
        fs::symlink_metadata(&self.path).is_ok()
    }

    /// Classify an I/O error against this path.
    pub fn io_error(&self, err: std::io::Error) -> FileError {
        FileError::from_io(err, &self.path, self.display_name())
    }

    /// Name used in messages sent to clients.
    pub fn display_name(&self) -> &str {
        if self.reference.is_empty() {
            "/"
        } else {
            &self.reference
        }
    }
}

/// Resolves [`FileReference`]s to paths confined to a root directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    /// Canonical root directory.
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for an existing root directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, FileError> {
        let root = root.as_ref();
        let canonical = fs::canonicalize(root)
            .map_err(|e| FileError::from_io(e, root, &root.display().to_string()))?;

        if !canonical.is_dir() {
            return Err(FileError::InvalidInput(format!(
                "root is not a directory: {}",
                root.display()
            )));
        }

        Ok(Self { root: canonical })
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parse a raw reference string and resolve it.
    ///
    /// `None` or an empty string resolves to the root.
    pub fn resolve_optional(&self, raw: Option<&str>) -> Result<ResolvedPath, FileError> {
        match raw {
            Some(raw) if !raw.is_empty() => self.resolve(&FileReference::new(raw)?),
            _ => Ok(self.root_path()),
        }
    }

    /// Resolve a reference to a path inside the root.
    pub fn resolve(&self, reference: &FileReference) -> Result<ResolvedPath, FileError> {
        let segments = reference.segments();
        let display = segments.join("/");

        let Some((name, parents)) = segments.split_last() else {
            return Ok(self.root_path());
        };

        let mut parent = self.root.clone();
        parent.extend(parents);

        let parent_canonical =
            fs::canonicalize(&parent).map_err(|e| FileError::from_io(e, &parent, &display))?;

        if !parent_canonical.starts_with(&self.root) {
            debug!(reference = %reference, resolved = ?parent_canonical, "Parent escapes root");
            return Err(FileError::PermissionDenied(display));
        }

        if !parent_canonical.is_dir() {
            return Err(FileError::NotFound(display));
        }

        let path = parent_canonical.join(name);
        self.check_symlink(&path, &display)?;

        Ok(ResolvedPath {
            reference: display,
            path,
        })
    }

    /// Whether an absolute path lies inside the root.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    fn root_path(&self) -> ResolvedPath {
        ResolvedPath {
            reference: String::new(),
            path: self.root.clone(),
        }
    }

    /// Reject a final symlink whose target resolves outside the root.
    ///
    /// Dangling links are allowed: acting on the link never touches a target.
    fn check_symlink(&self, path: &Path, display: &str) -> Result<(), FileError> {
        let is_symlink = fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);

        if !is_symlink {
            return Ok(());
        }

        match fs::canonicalize(path) {
            Ok(target) if !self.contains(&target) => {
                debug!(path = ?path, target = ?target, "Symlink points outside root");
                Err(FileError::PermissionDenied(display.to_string()))
            }
            _ => Ok(()),
        }
    }
}
