//! Directory listing.
//!
//! Paths handed to this module are already resolved under the root. Entries
//! are never followed: a symlink is reported as a symlink with its own
//! metadata, wherever it points.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::time::SystemTime;

use protocol::messages::{FileEntry, FileEntryType};
use tracing::debug;

use super::error::FileError;
use super::resolver::ResolvedPath;

/// A directory entry with metadata.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub entry_type: FileEntryType,
    /// Size in bytes (0 for anything but regular files).
    pub size: u64,
    /// Unix permissions mode.
    pub mode: u32,
    /// Last modified timestamp.
    pub modified: SystemTime,
}

impl DirectoryEntry {
    fn from_metadata(name: String, metadata: &fs::Metadata) -> Self {
        let file_type = metadata.file_type();
        let entry_type = if file_type.is_symlink() {
            FileEntryType::Symlink
        } else if file_type.is_dir() {
            FileEntryType::Directory
        } else if file_type.is_file() {
            FileEntryType::File
        } else {
            FileEntryType::Other
        };

        let size = if file_type.is_file() {
            metadata.len()
        } else {
            0
        };

        Self {
            name,
            entry_type,
            size,
            mode: metadata.mode(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }

    /// Convert to protocol FileEntry.
    pub fn to_protocol(&self) -> FileEntry {
        let modified = self
            .modified
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        FileEntry {
            name: self.name.clone(),
            entry_type: self.entry_type,
            size: self.size,
            mode: self.mode,
            modified,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.entry_type, FileEntryType::Directory)
    }
}

/// List contents of a resolved directory.
///
/// Hidden entries (starting with '.') are included if `include_hidden` is
/// true. Directories come first, then everything else, each group in
/// case-insensitive name order.
pub fn list_directory(
    directory: &ResolvedPath,
    include_hidden: bool,
) -> Result<Vec<DirectoryEntry>, FileError> {
    let metadata = fs::metadata(&directory.path).map_err(|e| directory.io_error(e))?;
    if !metadata.is_dir() {
        return Err(FileError::InvalidInput(format!(
            "not a directory: {}",
            directory.display_name()
        )));
    }

    let entries = fs::read_dir(&directory.path).map_err(|e| directory.io_error(e))?;

    let mut results = Vec::new();

    for entry_result in entries {
        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                debug!(dir = ?directory.path, error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().to_string();

        if !include_hidden && name.starts_with('.') {
            continue;
        }

        // DirEntry::metadata does not traverse symlinks
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                debug!(entry = %name, error = %e, "Skipping entry without metadata");
                continue;
            }
        };

        results.push(DirectoryEntry::from_metadata(name, &metadata));
    }

    results.sort_by(|a, b| match (a.is_dir(), b.is_dir()) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::OperationStatus;
    use std::os::unix::fs::symlink;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_test_structure(dir: &Path) {
        fs::create_dir_all(dir.join("subdir")).unwrap();
        fs::create_dir_all(dir.join(".hidden_dir")).unwrap();

        fs::write(dir.join("file.txt"), "Hello").unwrap();
        fs::write(dir.join("subdir/nested.txt"), "Nested").unwrap();
        fs::write(dir.join(".hidden"), "Hidden").unwrap();
    }

    fn resolved(path: &Path) -> ResolvedPath {
        ResolvedPath {
            reference: String::new(),
            path: path.to_path_buf(),
        }
    }

    #[test]
    fn test_list_directory() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());

        let entries = list_directory(&resolved(temp_dir.path()), false).unwrap();

        // file.txt and subdir, hidden entries excluded
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].name, "subdir");
        assert!(matches!(entries[0].entry_type, FileEntryType::Directory));
        assert_eq!(entries[0].size, 0);

        assert_eq!(entries[1].name, "file.txt");
        assert!(matches!(entries[1].entry_type, FileEntryType::File));
        assert_eq!(entries[1].size, 5);
    }

    #[test]
    fn test_list_directory_with_hidden() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());

        let entries = list_directory(&resolved(temp_dir.path()), true).unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&".hidden"));
        assert!(names.contains(&".hidden_dir"));
    }

    #[test]
    fn test_symlinks_reported_not_followed() {
        let temp_dir = TempDir::new().unwrap();
        let other_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());

        symlink(temp_dir.path().join("subdir"), temp_dir.path().join("link_to_dir")).unwrap();
        symlink(other_dir.path(), temp_dir.path().join("sneaky_link")).unwrap();

        let entries = list_directory(&resolved(temp_dir.path()), false).unwrap();

        for name in ["link_to_dir", "sneaky_link"] {
            let entry = entries.iter().find(|e| e.name == name).unwrap();
            assert!(matches!(entry.entry_type, FileEntryType::Symlink), "{name}");
            assert_eq!(entry.size, 0);
        }
        // Symlinks to directories do not sort with directories
        assert_eq!(entries[0].name, "subdir");
    }

    #[test]
    fn test_not_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("file.txt"), "Hello").unwrap();

        let result = list_directory(&resolved(&temp_dir.path().join("file.txt")), false);
        assert_eq!(result.unwrap_err().status(), OperationStatus::InvalidInput);
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();

        let result = list_directory(&resolved(&temp_dir.path().join("gone")), false);
        assert_eq!(result.unwrap_err().status(), OperationStatus::NotFound);
    }

    #[test]
    fn test_entry_to_protocol() {
        let entry = DirectoryEntry {
            name: "test.txt".to_string(),
            entry_type: FileEntryType::File,
            size: 1024,
            mode: 0o644,
            modified: SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1704067200),
        };

        let proto = entry.to_protocol();
        assert_eq!(proto.name, "test.txt");
        assert!(matches!(proto.entry_type, FileEntryType::File));
        assert_eq!(proto.size, 1024);
        assert_eq!(proto.mode, 0o644);
        assert_eq!(proto.modified, 1704067200);
    }

    #[test]
    fn test_directory_sorting() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("zebra.txt"), "z").unwrap();
        fs::write(temp_dir.path().join("Apple.txt"), "a").unwrap();
        fs::create_dir_all(temp_dir.path().join("beta_dir")).unwrap();
        fs::create_dir_all(temp_dir.path().join("Alpha_dir")).unwrap();

        let entries = list_directory(&resolved(temp_dir.path()), false).unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha_dir", "beta_dir", "Apple.txt", "zebra.txt"]);
    }
}
