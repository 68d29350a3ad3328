/*!
Storage adapters: byte-level persistence of one blob per logical key.

This module defines the storage abstraction (port) and its implementations
(adapters). Adapters know nothing about entities or codecs; the
[`Backend`](crate::Backend) layer on top of them does.
*/

pub mod encrypted;
pub mod file;
pub mod kv;

use crate::Result;

/// Storage abstraction for saving and loading encoded stores
///
/// Every call opens, uses and releases its resources before returning; no
/// adapter keeps a file handle between calls.
pub trait StorageAdapter {
    /// Save `data` under `key`, replacing whatever was there
    fn save(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Load the data stored under `key`
    ///
    /// Returns `Ok(None)` when nothing was ever stored, so callers can tell
    /// "never saved" apart from a failure.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Check if data exists for `key`
    fn exists(&self, key: &str) -> bool;

    /// Delete the data stored under `key`. Deleting nothing is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

pub use encrypted::EncryptedStorage;
pub use file::FileStorage;
pub use kv::KeyValueStorage;
