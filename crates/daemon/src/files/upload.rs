//! Staged uploads with atomic publication.
//!
//! This module provides:
//! - Filename sanitizing and extension policy checks
//! - Streaming writes into hidden temp files next to the destination
//! - All-or-nothing batches: nothing is published unless every file staged
//! - Atomic publication by rename (or hard link when overwrite is off)

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use protocol::messages::UploadedFile;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::error::FileError;
use super::resolver::ResolvedPath;
use crate::config::{normalize_extension, FileConfig};

/// Maximum length of a sanitized file name in bytes.
pub const MAX_FILENAME_LEN: usize = 255;

/// Suffix of staged temp files.
const STAGING_SUFFIX: &str = ".upload";

/// Size and extension rules applied to every uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Maximum size of one file in bytes.
    pub max_size: u64,
    /// Accepted final extensions; empty accepts anything not denied.
    pub allowed_extensions: Vec<String>,
    /// Extensions rejected anywhere in the name.
    pub denied_extensions: Vec<String>,
}

impl UploadPolicy {
    /// Build the policy from file configuration.
    pub fn from_config(config: &FileConfig) -> Self {
        Self {
            max_size: config.max_size,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            denied_extensions: config
                .denied_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
        }
    }

    /// Check a sanitized file name against the extension rules.
    ///
    /// Every dotted run of the name is checked against the deny list, so
    /// `shell.php.jpg` is rejected when `php` is denied and `backup.tar.gz`
    /// when `tar.gz` is. The allow list matches any dotted suffix, so
    /// `tar.gz` and `gz` both admit `backup.tar.gz`.
    pub fn check_extension(&self, name: &str) -> Result<(), FileError> {
        let parts: Vec<String> = name
            .split('.')
            .skip(1)
            .map(|p| p.to_ascii_lowercase())
            .collect();

        for start in 0..parts.len() {
            for end in start + 1..=parts.len() {
                let run = parts[start..end].join(".");
                if self.denied_extensions.contains(&run) {
                    return Err(FileError::InvalidInput(format!(
                        "file type .{} is not allowed: {}",
                        run, name
                    )));
                }
            }
        }

        if self.allowed_extensions.is_empty() {
            return Ok(());
        }

        let allowed = (0..parts.len())
            .map(|start| parts[start..].join("."))
            .any(|suffix| self.allowed_extensions.contains(&suffix));
        if allowed {
            Ok(())
        } else {
            Err(FileError::InvalidInput(format!(
                "file type is not in the allowed list: {}",
                name
            )))
        }
    }
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Directory parts are stripped. Empty names, `.` and `..`, hidden names,
/// control characters and names longer than [`MAX_FILENAME_LEN`] bytes are
/// rejected.
pub fn sanitize_filename(raw: &str) -> Result<String, FileError> {
    let invalid = |why: &str| FileError::InvalidInput(format!("{}: {:?}", why, raw));

    let basename = raw
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    if basename.is_empty() || basename == "." || basename == ".." {
        return Err(invalid("invalid file name"));
    }
    if basename.starts_with('.') {
        return Err(invalid("hidden file names are not allowed"));
    }
    if basename.chars().any(|c| c.is_control()) {
        return Err(invalid("file name contains control characters"));
    }
    if basename.len() > MAX_FILENAME_LEN {
        return Err(invalid("file name is too long"));
    }

    Ok(basename.to_string())
}

/// A file being written to a temp location.
///
/// Dropping a staged upload that was not published removes its temp file.
#[derive(Debug)]
pub struct StagedUpload {
    /// Sanitized file name.
    name: String,
    /// Root-relative destination.
    reference: String,
    /// Final location.
    destination: PathBuf,
    /// Temp file in the destination directory.
    temp_path: PathBuf,
    /// Open handle, `None` once closed.
    file: Option<File>,
    /// SHA-256 of everything written so far.
    hasher: Sha256,
    /// Bytes written so far.
    size: u64,
    /// Size limit.
    max_size: u64,
    /// Whether the temp file has been moved into place.
    published: bool,
}

impl StagedUpload {
    fn create(
        name: String,
        directory: &ResolvedPath,
        max_size: u64,
    ) -> Result<Self, FileError> {
        let destination = directory.path.join(&name);
        let reference = if directory.is_root() {
            name.clone()
        } else {
            format!("{}/{}", directory.reference, name)
        };

        let temp_path = directory.path.join(format!(
            ".{:016x}{}",
            rand::random::<u64>(),
            STAGING_SUFFIX
        ));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(|e| FileError::from_io(e, &temp_path, &reference))?;

        debug!(name = %name, temp = ?temp_path, "Staging upload");

        Ok(Self {
            name,
            reference,
            destination,
            temp_path,
            file: Some(file),
            hasher: Sha256::new(),
            size: 0,
            max_size,
            published: false,
        })
    }

    /// Bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append a chunk, enforcing the size limit.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<(), FileError> {
        let new_size = self.size + data.len() as u64;
        if new_size > self.max_size {
            return Err(FileError::InvalidInput(format!(
                "{} exceeds the size limit of {} bytes",
                self.name, self.max_size
            )));
        }

        let file = self.file.as_mut().ok_or_else(|| FileError::Storage {
            path: self.temp_path.clone(),
            source: std::io::Error::other("file handle not available"),
        })?;
        file.write_all(data)
            .map_err(|e| FileError::from_io(e, &self.temp_path, &self.reference))?;

        self.hasher.update(data);
        self.size = new_size;
        Ok(())
    }

    fn destination_exists(&self) -> bool {
        fs::symlink_metadata(&self.destination).is_ok()
    }

    /// Flush to disk and move the temp file into place.
    ///
    /// With `overwrite` the move is a single rename. Without it the temp file
    /// is hard-linked to the destination, which fails atomically if the
    /// destination appeared in the meantime.
    fn publish(mut self, overwrite: bool) -> Result<UploadedFile, FileError> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .map_err(|e| FileError::from_io(e, &self.temp_path, &self.reference))?;
        }

        let io_err = |e| FileError::from_io(e, &self.destination, &self.reference);
        if overwrite {
            if self.destination.is_dir() && !self.destination.is_symlink() {
                return Err(FileError::Conflict(self.reference.clone()));
            }
            fs::rename(&self.temp_path, &self.destination).map_err(io_err)?;
        } else {
            match fs::hard_link(&self.temp_path, &self.destination) {
                Ok(()) => {
                    if let Err(e) = fs::remove_file(&self.temp_path) {
                        warn!(path = ?self.temp_path, error = %e, "Failed to remove staged file after linking");
                    }
                }
                Err(e) if link_unsupported(&e) => {
                    debug!(path = ?self.destination, error = %e, "Hard links unavailable, claiming destination");
                    claim_and_rename(&self.temp_path, &self.destination).map_err(io_err)?;
                }
                Err(e) => return Err(io_err(e)),
            }
        }
        self.published = true;

        let sha256 = hex::encode(self.hasher.clone().finalize());
        Ok(UploadedFile {
            name: self.name.clone(),
            path: self.reference.clone(),
            size: self.size,
            sha256,
        })
    }
}

/// Whether a failed `link(2)` means the filesystem cannot hard-link at all.
fn link_unsupported(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::Unsupported | std::io::ErrorKind::PermissionDenied
    )
}

/// No-clobber publish for filesystems without hard links.
///
/// An empty placeholder is created with `create_new`, which fails if the
/// destination exists, and the staged file is then renamed over it. Readers
/// may briefly see the empty placeholder.
fn claim_and_rename(temp_path: &Path, destination: &Path) -> std::io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;
    if let Err(e) = fs::rename(temp_path, destination) {
        let _ = fs::remove_file(destination);
        return Err(e);
    }
    Ok(())
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        drop(self.file.take());
        if let Err(e) = fs::remove_file(&self.temp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = ?self.temp_path, error = %e, "Failed to cleanup staged upload");
            }
        }
    }
}

/// A set of files uploaded together into one directory.
///
/// Files are staged as they arrive. [`UploadBatch::commit`] publishes all of
/// them; dropping the batch instead discards every staged file.
#[derive(Debug)]
pub struct UploadBatch {
    directory: ResolvedPath,
    policy: UploadPolicy,
    overwrite: bool,
    names: HashSet<String>,
    staged: Vec<StagedUpload>,
}

impl UploadBatch {
    pub(crate) fn new(directory: ResolvedPath, policy: UploadPolicy, overwrite: bool) -> Self {
        Self {
            directory,
            policy,
            overwrite,
            names: HashSet::new(),
            staged: Vec::new(),
        }
    }

    /// Start staging a file; write its content through the returned handle.
    ///
    /// Fails if the name is unsafe, duplicates another file of the batch, or
    /// has a rejected extension.
    pub fn add_file(&mut self, raw_name: &str) -> Result<&mut StagedUpload, FileError> {
        let name = sanitize_filename(raw_name)?;
        self.policy.check_extension(&name)?;

        if !self.names.insert(name.clone()) {
            return Err(FileError::InvalidInput(format!(
                "duplicate file name in upload: {}",
                name
            )));
        }

        let staged = StagedUpload::create(name, &self.directory, self.policy.max_size)?;
        self.staged.push(staged);
        let index = self.staged.len() - 1;
        Ok(&mut self.staged[index])
    }

    /// Append data to the file added last.
    pub fn append(&mut self, data: &[u8]) -> Result<(), FileError> {
        match self.staged.last_mut() {
            Some(staged) => staged.write_chunk(data),
            None => Err(FileError::InvalidInput(
                "file content without a file name".to_string(),
            )),
        }
    }

    /// Number of files staged so far.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Whether no file has been staged.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Publish every staged file.
    ///
    /// Without overwrite, all destinations are checked before anything is
    /// published so a conflict leaves the directory untouched.
    pub fn commit(mut self) -> Result<Vec<UploadedFile>, FileError> {
        if self.staged.is_empty() {
            return Err(FileError::InvalidInput("no files in upload".to_string()));
        }

        if !self.overwrite {
            if let Some(existing) = self.staged.iter().find(|s| s.destination_exists()) {
                return Err(FileError::Conflict(existing.reference.clone()));
            }
        }

        let mut published = Vec::with_capacity(self.staged.len());
        for staged in self.staged.drain(..) {
            let file = staged.publish(self.overwrite)?;
            info!(path = %file.path, size = file.size, "File uploaded");
            published.push(file);
        }

        Ok(published)
    }
}
