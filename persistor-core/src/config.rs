//! Configuration module for backend selection and settings
//!
//! A [`StorageConfig`] names one of the storage strategies and carries its
//! parameters. [`create_backend_from_config`](crate::create_backend_from_config)
//! turns it into a ready backend.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{PersistError, Result};

/// Enumeration of supported storage strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Cleartext JSON file
    JsonFile,
    /// MessagePack file
    BinaryFile,
    /// AES-128 encrypted MessagePack file
    EncryptedFile,
    /// Key-value table, process-local or mirrored to a file
    KeyValue,
}

impl BackendKind {
    /// URI scheme used by [`StorageConfig::from_uri`]
    pub fn scheme(self) -> &'static str {
        match self {
            BackendKind::JsonFile => "json",
            BackendKind::BinaryFile => "bin",
            BackendKind::EncryptedFile => "aes",
            BackendKind::KeyValue => "kv",
        }
    }

    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "json" => Some(BackendKind::JsonFile),
            "bin" => Some(BackendKind::BinaryFile),
            "aes" => Some(BackendKind::EncryptedFile),
            "kv" => Some(BackendKind::KeyValue),
            _ => None,
        }
    }
}

/// Configuration structure for backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// The storage strategy to use
    pub backend: BackendKind,
    /// Store file (required for file backends, optional for key-value)
    pub path: Option<PathBuf>,
    /// Gzip the encoded store (file backends only)
    #[serde(default)]
    pub compress: bool,
    /// Fixed passphrase for the encrypted backend instead of the logical key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
}

impl StorageConfig {
    fn with_backend(backend: BackendKind, path: Option<PathBuf>) -> Self {
        StorageConfig {
            backend,
            path,
            compress: false,
            passphrase: None,
        }
    }

    /// Configuration for a cleartext JSON file
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        Self::with_backend(BackendKind::JsonFile, Some(path.into()))
    }

    /// Configuration for a MessagePack file
    pub fn binary_file(path: impl Into<PathBuf>) -> Self {
        Self::with_backend(BackendKind::BinaryFile, Some(path.into()))
    }

    /// Configuration for an encrypted file
    pub fn encrypted_file(path: impl Into<PathBuf>) -> Self {
        Self::with_backend(BackendKind::EncryptedFile, Some(path.into()))
    }

    /// Configuration for a key-value table, mirrored to `path` when given
    pub fn key_value(path: Option<PathBuf>) -> Self {
        Self::with_backend(BackendKind::KeyValue, path)
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Parse a store URI into a configuration
    ///
    /// Supports formats:
    /// - `json:<path>`, `bin:<path>`, `aes:<path>` for file backends
    /// - `kv:<path>` for a file-mirrored key-value table
    /// - `kv:` for a process-local key-value table
    pub fn from_uri(uri: &str) -> Result<StorageConfig> {
        let (scheme, rest) = uri.split_once(':').ok_or_else(|| {
            PersistError::validation(format!(
                "Invalid store URI '{uri}': expected <scheme>:<path>"
            ))
        })?;
        let backend = BackendKind::from_scheme(scheme).ok_or_else(|| {
            PersistError::validation(format!(
                "Invalid store URI '{uri}': unknown scheme '{scheme}' (expected json, bin, aes or kv)"
            ))
        })?;

        let path = (!rest.is_empty()).then(|| PathBuf::from(rest));
        if path.is_none() && backend != BackendKind::KeyValue {
            return Err(PersistError::validation(format!(
                "Invalid store URI '{uri}': missing path"
            )));
        }

        Ok(Self::with_backend(backend, path))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            BackendKind::JsonFile | BackendKind::BinaryFile | BackendKind::EncryptedFile => {
                if self.path.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
                    return Err(PersistError::configuration(format!(
                        "{:?} backend requires a path",
                        self.backend
                    )));
                }
            }
            BackendKind::KeyValue => {
                if self.compress {
                    return Err(PersistError::validation(
                        "Key-value tables hold text; compression is not supported",
                    ));
                }
            }
        }

        if self.passphrase.is_some() && self.backend != BackendKind::EncryptedFile {
            return Err(PersistError::validation(
                "A passphrase only applies to the encrypted file backend",
            ));
        }
        if self.passphrase.as_deref() == Some("") {
            return Err(PersistError::validation("Passphrase must not be empty"));
        }
        Ok(())
    }
}
