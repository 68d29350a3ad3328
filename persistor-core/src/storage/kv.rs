/*!
Key-value table storage adapter.
*/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::file::write_atomic;
use super::StorageAdapter;
use crate::{PersistError, Result};

type Table = BTreeMap<String, String>;

/// A string table holding one entry per logical key
///
/// `in_memory()` tables live for the process; clones share the same table.
/// `persistent(path)` tables are additionally mirrored to a JSON file that is
/// rewritten after every change.
#[derive(Debug, Clone, Default)]
pub struct KeyValueStorage {
    table: Arc<Mutex<Table>>,
    file: Option<PathBuf>,
}

impl KeyValueStorage {
    /// Create an empty process-local table
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a table mirrored to `path`, reading existing entries if present
    pub fn persistent<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table: Table = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                PersistError::invalid_format(format!(
                    "Key-value table {} is not valid: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Table::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), entries = table.len(), "Opened key-value table");
        Ok(Self {
            table: Arc::new(Mutex::new(table)),
            file: Some(path),
        })
    }

    /// Keys currently present in the table
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Table>> {
        self.table
            .lock()
            .map_err(|_| PersistError::storage("Key-value table lock poisoned"))
    }

    fn flush(&self, table: &Table) -> Result<()> {
        if let Some(path) = &self.file {
            let raw = serde_json::to_vec(table).map_err(|e| PersistError::codec::<Table, _>("encode", e))?;
            write_atomic(path, &raw)?;
        }
        Ok(())
    }
}

impl StorageAdapter for KeyValueStorage {
    fn save(&self, key: &str, data: &[u8]) -> Result<()> {
        let value = std::str::from_utf8(data).map_err(|_| {
            PersistError::invalid_format("Key-value tables only hold text; use a text codec")
        })?;

        let mut table = self.lock()?;
        let previous = table.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&table) {
            match previous {
                Some(previous) => table.insert(key.to_string(), previous),
                None => table.remove(key),
            };
            return Err(e);
        }

        debug!(key = %key, bytes = data.len(), "Stored key-value entry");
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let table = self.lock()?;
        Ok(table
            .get(key)
            .filter(|value| !value.is_empty())
            .map(|value| value.as_bytes().to_vec()))
    }

    fn exists(&self, key: &str) -> bool {
        self.lock()
            .map(|table| table.get(key).is_some_and(|value| !value.is_empty()))
            .unwrap_or(false)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut table = self.lock()?;
        if let Some(previous) = table.remove(key) {
            if let Err(e) = self.flush(&table) {
                table.insert(key.to_string(), previous);
                return Err(e);
            }
            debug!(key = %key, "Deleted key-value entry");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.file {
            Some(path) => format!("key-value table {}", path.display()),
            None => "in-memory key-value table".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_table() {
        let storage = KeyValueStorage::in_memory();

        assert_eq!(storage.load("C1").unwrap(), None);
        storage.save("C1", b"{\"a\":1}").unwrap();
        storage.save("C2", b"{\"b\":2}").unwrap();

        assert_eq!(storage.load("C1").unwrap(), Some(b"{\"a\":1}".to_vec()));
        assert!(storage.exists("C2"));
        assert_eq!(storage.keys().unwrap(), vec!["C1".to_string(), "C2".to_string()]);

        storage.delete("C1").unwrap();
        assert!(!storage.exists("C1"));
        assert!(storage.delete("C1").is_ok());
    }

    #[test]
    fn test_clones_share_the_table() {
        let storage = KeyValueStorage::in_memory();
        let other = storage.clone();

        storage.save("C1", b"shared").unwrap();
        assert_eq!(other.load("C1").unwrap(), Some(b"shared".to_vec()));
    }

    #[test]
    fn test_empty_value_reads_as_absent() {
        let storage = KeyValueStorage::in_memory();
        storage.save("C1", b"").unwrap();
        assert_eq!(storage.load("C1").unwrap(), None);
        assert!(!storage.exists("C1"));
    }

    #[test]
    fn test_rejects_binary_data() {
        let storage = KeyValueStorage::in_memory();
        let result = storage.save("C1", &[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(PersistError::InvalidFormat(_))));
    }

    #[test]
    fn test_persistent_table_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prefs.json");

        let storage = KeyValueStorage::persistent(&path).unwrap();
        storage.save("C1", b"{\"score\":100}").unwrap();
        storage.save("C2", b"{\"score\":5}").unwrap();
        storage.delete("C2").unwrap();
        drop(storage);

        let reopened = KeyValueStorage::persistent(&path).unwrap();
        assert_eq!(reopened.load("C1").unwrap(), Some(b"{\"score\":100}".to_vec()));
        assert_eq!(reopened.load("C2").unwrap(), None);
    }

    #[test]
    fn test_persistent_table_rejects_garbage_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prefs.json");
        std::fs::write(&path, b"not json").unwrap();

        let result = KeyValueStorage::persistent(&path);
        assert!(matches!(result, Err(PersistError::InvalidFormat(_))));
    }
}
