/*!
Single-file storage adapter.
*/

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::StorageAdapter;
use crate::{PersistError, Result};

/// Stores one blob in one file
///
/// A file holds a single logical store, so the `key` argument is accepted and
/// ignored. Writes are atomic: the blob goes to a temporary file next to the
/// destination and is renamed over it, so readers never observe a half
/// written file.
///
/// # Example
/// ```rust
/// use persistor_core::storage::{FileStorage, StorageAdapter};
///
/// let dir = tempfile::tempdir()?;
/// let storage = FileStorage::new(dir.path().join("saves/state.json"));
/// storage.save("ignored", b"{}")?;
/// assert_eq!(storage.load("ignored")?, Some(b"{}".to_vec()));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Create a file storage adapter writing to `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageAdapter for FileStorage {
    fn save(&self, _key: &str, data: &[u8]) -> Result<()> {
        write_atomic(&self.path, data)?;
        debug!(path = %self.path.display(), bytes = data.len(), "Wrote store file");
        Ok(())
    }

    fn load(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(data) => {
                debug!(path = %self.path.display(), bytes = data.len(), "Read store file");
                Ok(Some(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistError::storage(format!(
                "Failed to read store from {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn exists(&self, _key: &str) -> bool {
        self.path.is_file()
    }

    fn delete(&self, _key: &str) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Deleted store file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistError::storage(format!(
                "Failed to delete store {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Replace `path` with `data` via a synced temporary file and a rename
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| {
            PersistError::storage(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        PersistError::storage(format!(
            "Failed to replace {}: {}",
            path.display(),
            e.error
        ))
    })?;
    Ok(())
}
