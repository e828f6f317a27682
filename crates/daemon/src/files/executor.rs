//! File operations confined to the managed root.
//!
//! [`FileExecutor`] is the single entry point used by the HTTP handlers. Every
//! operation resolves its references through the [`PathResolver`] first, so
//! nothing here ever touches a path outside the root.

use std::fs;
use std::path::Path;

use protocol::messages::{
    BulkDeleteResponse, BulkFailure, BulkStatus, ListResponse, UploadedFile,
};
use protocol::{FileReference, OperationResult};
use tracing::{debug, info, warn};

use super::browser::list_directory;
use super::error::FileError;
use super::resolver::{PathResolver, ResolvedPath};
use super::upload::{UploadBatch, UploadPolicy};
use crate::config::FileConfig;

/// Executes file operations under a fixed root.
#[derive(Debug, Clone)]
pub struct FileExecutor {
    resolver: PathResolver,
    policy: UploadPolicy,
    allow_overwrite: bool,
    bulk_stop_on_error: bool,
}

impl FileExecutor {
    /// Create an executor from file configuration.
    ///
    /// The root directory must already exist.
    pub fn new(config: &FileConfig) -> Result<Self, FileError> {
        Ok(Self {
            resolver: PathResolver::new(&config.root)?,
            policy: UploadPolicy::from_config(config),
            allow_overwrite: config.allow_overwrite,
            bulk_stop_on_error: config.bulk_stop_on_error,
        })
    }

    /// The resolver every operation goes through.
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    fn check_overwrite(&self, overwrite: bool) -> Result<(), FileError> {
        if overwrite && !self.allow_overwrite {
            return Err(FileError::PermissionDenied(
                "overwriting existing files is disabled".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve_mutable(&self, reference: &FileReference) -> Result<ResolvedPath, FileError> {
        let resolved = self.resolver.resolve(reference)?;
        if resolved.is_root() {
            return Err(FileError::InvalidInput(
                "the root directory cannot be modified".to_string(),
            ));
        }
        Ok(resolved)
    }

    /// Move `old` to `new` with a single atomic rename.
    ///
    /// Renaming an entry onto itself succeeds without touching anything.
    pub fn rename(
        &self,
        old: &FileReference,
        new: &FileReference,
        overwrite: bool,
    ) -> Result<OperationResult, FileError> {
        self.check_overwrite(overwrite)?;

        let source = self.resolve_mutable(old)?;
        let destination = self.resolve_mutable(new)?;

        let source_meta = source.metadata()?;

        if source.path == destination.path {
            debug!(path = %source.reference, "Rename onto itself");
            return Ok(OperationResult::success("renamed").with_path(destination.reference));
        }

        let source_is_dir = source_meta.file_type().is_dir();
        if source_is_dir && destination.path.starts_with(&source.path) {
            return Err(FileError::InvalidInput(format!(
                "cannot move {} into itself",
                source.reference
            )));
        }

        // Checked before renaming; a destination created in between is replaced.
        if let Ok(dest_meta) = fs::symlink_metadata(&destination.path) {
            if !overwrite {
                return Err(FileError::Conflict(destination.reference));
            }
            if dest_meta.file_type().is_dir() != source_is_dir {
                debug!(path = %destination.reference, "Destination has a different type");
                return Err(FileError::Conflict(destination.reference));
            }
        }

        fs::rename(&source.path, &destination.path).map_err(|e| destination.io_error(e))?;

        info!(from = %source.reference, to = %destination.reference, "Renamed");
        Ok(OperationResult::success("renamed").with_path(destination.reference))
    }

    /// Delete a file, symlink or directory tree.
    ///
    /// Symlinks are unlinked, never followed.
    pub fn delete(&self, reference: &FileReference) -> Result<OperationResult, FileError> {
        let target = self.resolve_mutable(reference)?;
        remove_entry(&target)?;

        info!(path = %target.reference, "Deleted");
        Ok(OperationResult::success("deleted").with_path(target.reference))
    }

    /// Delete every reference independently and report per item.
    ///
    /// Failures never abort the batch unless `bulk_stop_on_error` is set, in
    /// which case the remaining references are reported as skipped.
    pub fn bulk_delete<S: AsRef<str>>(&self, paths: &[S]) -> Result<BulkDeleteResponse, FileError> {
        if paths.is_empty() {
            return Err(FileError::InvalidInput("no paths to delete".to_string()));
        }

        let mut response = BulkDeleteResponse::default();

        for (index, raw) in paths.iter().enumerate() {
            let raw = raw.as_ref();
            let outcome = FileReference::new(raw)
                .map_err(FileError::from)
                .and_then(|reference| self.delete(&reference));

            match outcome {
                Ok(result) => {
                    response
                        .deleted
                        .push(result.path.unwrap_or_else(|| raw.to_string()));
                }
                Err(err) => {
                    if let FileError::Storage { path, source } = &err {
                        warn!(path = ?path, error = %source, "Bulk delete item failed");
                    }
                    response.failures.push(BulkFailure {
                        path: raw.to_string(),
                        status: err.status(),
                        message: err.client_message(),
                    });

                    if self.bulk_stop_on_error {
                        response.skipped = paths[index + 1..]
                            .iter()
                            .map(|p| p.as_ref().to_string())
                            .collect();
                        break;
                    }
                }
            }
        }

        if !response.failures.is_empty() || !response.skipped.is_empty() {
            response.status = BulkStatus::Partial;
        }

        info!(
            deleted = response.deleted.len(),
            failed = response.failures.len(),
            skipped = response.skipped.len(),
            "Bulk delete finished"
        );
        Ok(response)
    }

    /// Start an upload batch into `directory` (the root when `None`).
    pub fn begin_upload(
        &self,
        directory: Option<&str>,
        overwrite: bool,
    ) -> Result<UploadBatch, FileError> {
        self.check_overwrite(overwrite)?;

        let dir = self.resolver.resolve_optional(directory)?;
        let metadata = fs::metadata(&dir.path).map_err(|e| dir.io_error(e))?;
        if !metadata.is_dir() {
            return Err(FileError::InvalidInput(format!(
                "upload destination is not a directory: {}",
                dir.display_name()
            )));
        }

        Ok(UploadBatch::new(dir, self.policy.clone(), overwrite))
    }

    /// Upload in-memory files as one batch.
    pub fn upload_files<'a, I>(
        &self,
        directory: Option<&str>,
        files: I,
        overwrite: bool,
    ) -> Result<Vec<UploadedFile>, FileError>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut batch = self.begin_upload(directory, overwrite)?;
        for (name, content) in files {
            batch.add_file(name)?.write_chunk(content)?;
        }
        batch.commit()
    }

    /// List a directory (the root when `None`).
    pub fn list(
        &self,
        directory: Option<&str>,
        include_hidden: bool,
    ) -> Result<ListResponse, FileError> {
        let dir = self.resolver.resolve_optional(directory)?;
        let entries = list_directory(&dir, include_hidden)?;

        Ok(ListResponse {
            path: dir.reference,
            entries: entries.iter().map(|e| e.to_protocol()).collect(),
        })
    }
}

fn remove_entry(target: &ResolvedPath) -> Result<(), FileError> {
    let metadata = target.metadata()?;
    let path: &Path = &target.path;

    let result = if metadata.file_type().is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|e| target.io_error(e))
}
