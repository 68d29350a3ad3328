/*!
Backends: container-level persistence strategies.

A [`Backend`] stores a whole [`DataEntitiesContainer`] under a logical key.
[`StorageBackend`] builds one from three pieces: a byte-level
[`StorageAdapter`], a [`Codec`] and a [`CompressionAdapter`].

| Strategy       | Adapter                          | Codec              |
|----------------|----------------------------------|--------------------|
| JSON file      | [`FileStorage`]                  | [`JsonCodec`]        |
| Binary file    | [`FileStorage`]                  | [`MessagePackCodec`] |
| Encrypted file | [`EncryptedStorage`]             | [`MessagePackCodec`] |
| Key-value      | [`KeyValueStorage`]              | [`JsonCodec`]        |
*/

use std::path::Path;

use tracing::debug;

use crate::codec::{Codec, JsonCodec, MessagePackCodec, PayloadFormat};
use crate::compression::{CompressionAdapter, GzipCompressor, NoCompression};
use crate::config::{BackendKind, StorageConfig};
use crate::storage::{EncryptedStorage, FileStorage, KeyValueStorage, StorageAdapter};
use crate::{DataEntitiesContainer, PersistError, Result};

/// Pluggable strategy that persists and retrieves one store per logical key
#[cfg_attr(test, mockall::automock)]
pub trait Backend {
    /// Persist `container` under `key`, fully replacing the previous store
    fn save(&self, key: &str, container: &DataEntitiesContainer) -> Result<()>;

    /// Retrieve the store for `key`; `Ok(None)` if it was never saved
    fn load(&self, key: &str) -> Result<Option<DataEntitiesContainer>>;

    /// Remove the store for `key`. Removing an absent store succeeds.
    fn delete(&self, key: &str) -> Result<()>;

    /// Whether a store was written for `key`, without decoding it
    fn exists(&self, key: &str) -> bool;

    /// Payload encoding entity state should use with this backend
    fn payload_format(&self) -> PayloadFormat;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn save(&self, key: &str, container: &DataEntitiesContainer) -> Result<()> {
        (**self).save(key, container)
    }

    fn load(&self, key: &str) -> Result<Option<DataEntitiesContainer>> {
        (**self).load(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn exists(&self, key: &str) -> bool {
        (**self).exists(key)
    }

    fn payload_format(&self) -> PayloadFormat {
        (**self).payload_format()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Backend composed of a storage adapter, a codec and a compressor
#[derive(Debug, Clone)]
pub struct StorageBackend<S, C, Z = NoCompression> {
    storage: S,
    codec: C,
    compressor: Z,
}

/// Cleartext JSON in a single file
pub type JsonFileBackend = StorageBackend<FileStorage, JsonCodec>;
/// MessagePack in a single file
pub type BinaryFileBackend = StorageBackend<FileStorage, MessagePackCodec>;
/// AES-128 encrypted MessagePack in a single file
pub type EncryptedFileBackend = StorageBackend<EncryptedStorage<FileStorage>, MessagePackCodec>;
/// JSON text in a key-value table
pub type KeyValueBackend = StorageBackend<KeyValueStorage, JsonCodec>;

impl<S, C> StorageBackend<S, C>
where
    S: StorageAdapter,
    C: Codec,
{
    /// Create a backend without compression
    pub fn new(storage: S, codec: C) -> Self {
        Self {
            storage,
            codec,
            compressor: NoCompression,
        }
    }
}

impl<S, C, Z> StorageBackend<S, C, Z> {
    /// Swap the compression layer
    pub fn with_compressor<Z2: CompressionAdapter>(self, compressor: Z2) -> StorageBackend<S, C, Z2> {
        StorageBackend {
            storage: self.storage,
            codec: self.codec,
            compressor,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }
}

impl JsonFileBackend {
    pub fn json_file<P: AsRef<Path>>(path: P) -> Self {
        Self::new(FileStorage::new(path), JsonCodec)
    }
}

impl BinaryFileBackend {
    pub fn binary_file<P: AsRef<Path>>(path: P) -> Self {
        Self::new(FileStorage::new(path), MessagePackCodec)
    }
}

impl EncryptedFileBackend {
    pub fn encrypted_file<P: AsRef<Path>>(path: P) -> Self {
        Self::new(EncryptedStorage::new(FileStorage::new(path)), MessagePackCodec)
    }
}

impl KeyValueBackend {
    pub fn key_value(store: KeyValueStorage) -> Self {
        Self::new(store, JsonCodec)
    }
}

impl<S, C, Z> Backend for StorageBackend<S, C, Z>
where
    S: StorageAdapter,
    C: Codec,
    Z: CompressionAdapter,
{
    fn save(&self, key: &str, container: &DataEntitiesContainer) -> Result<()> {
        let encoded = self.codec.encode(container)?;
        let blob = self.compressor.compress(&encoded)?;

        debug!(
            key = %key,
            codec = self.codec.name(),
            compression = self.compressor.algorithm_name(),
            bytes = blob.len(),
            "Saving store"
        );
        #[cfg(feature = "metrics")]
        crate::observability::PersistMetrics::global().record_store_size(blob.len());

        self.storage.save(key, &blob)
    }

    fn load(&self, key: &str) -> Result<Option<DataEntitiesContainer>> {
        let blob = match self.storage.load(key)? {
            Some(blob) => blob,
            None => {
                debug!(key = %key, storage = %self.storage.describe(), "No store found");
                return Ok(None);
            }
        };

        let encoded = self.compressor.decompress(&blob)?;
        let container: DataEntitiesContainer = self.codec.decode(&encoded)?;
        container.ensure_compatible()?;
        Ok(Some(container))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.storage.delete(key)
    }

    fn exists(&self, key: &str) -> bool {
        self.storage.exists(key)
    }

    fn payload_format(&self) -> PayloadFormat {
        self.codec.format()
    }

    fn describe(&self) -> String {
        format!(
            "{} ({}, compression: {})",
            self.storage.describe(),
            self.codec.name(),
            self.compressor.algorithm_name()
        )
    }
}

/// Create a backend from configuration
///
/// # Example
/// ```rust
/// use persistor_core::{create_backend_from_config, StorageConfig};
///
/// let dir = tempfile::tempdir()?;
/// let backend = create_backend_from_config(StorageConfig::json_file(dir.path().join("s.json")))?;
/// assert!(backend.load("C1")?.is_none());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_backend_from_config(config: StorageConfig) -> Result<Box<dyn Backend>> {
    config.validate()?;

    let backend: Box<dyn Backend> = match config.backend {
        BackendKind::JsonFile => {
            let storage = FileStorage::new(required_path(&config)?);
            compressed(StorageBackend::new(storage, JsonCodec), config.compress)
        }
        BackendKind::BinaryFile => {
            let storage = FileStorage::new(required_path(&config)?);
            compressed(StorageBackend::new(storage, MessagePackCodec), config.compress)
        }
        BackendKind::EncryptedFile => {
            let mut storage = EncryptedStorage::new(FileStorage::new(required_path(&config)?));
            if let Some(passphrase) = &config.passphrase {
                storage = storage.with_passphrase(passphrase.clone());
            }
            compressed(StorageBackend::new(storage, MessagePackCodec), config.compress)
        }
        BackendKind::KeyValue => {
            let store = match &config.path {
                Some(path) => KeyValueStorage::persistent(path)?,
                None => KeyValueStorage::in_memory(),
            };
            Box::new(KeyValueBackend::key_value(store))
        }
    };

    debug!(backend = %backend.describe(), "Created backend from config");
    Ok(backend)
}

fn required_path(config: &StorageConfig) -> Result<&Path> {
    config.path.as_deref().ok_or_else(|| {
        PersistError::configuration(format!("{:?} backend requires a path", config.backend))
    })
}

fn compressed<S, C>(backend: StorageBackend<S, C>, compress: bool) -> Box<dyn Backend>
where
    S: StorageAdapter + 'static,
    C: Codec + 'static,
{
    if compress {
        Box::new(backend.with_compressor(GzipCompressor::new()))
    } else {
        Box::new(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Payload;
    use crate::entity::STORE_FORMAT_VERSION;
    use crate::{DataEntity, EntityId};
    use tempfile::TempDir;

    fn sample_container() -> DataEntitiesContainer {
        DataEntitiesContainer::new(vec![
            DataEntity {
                entity_id: EntityId::from(7),
                payload: Payload::Text(r#"{"id":7,"score":100}"#.to_string()),
            },
            DataEntity {
                entity_id: EntityId::from("settings"),
                payload: Payload::Binary(vec![0x81, 0xa1, 0x76, 0x01]),
            },
        ])
    }

    fn all_file_backends(dir: &TempDir) -> Vec<Box<dyn Backend>> {
        vec![
            Box::new(JsonFileBackend::json_file(dir.path().join("s.json"))),
            Box::new(BinaryFileBackend::binary_file(dir.path().join("s.dat"))),
            Box::new(EncryptedFileBackend::new(
                EncryptedStorage::new(FileStorage::new(dir.path().join("s.aes"))).with_rounds(100),
                MessagePackCodec,
            )),
            Box::new(
                JsonFileBackend::json_file(dir.path().join("s.json.gz")).with_compressor(GzipCompressor::new()),
            ),
        ]
    }

    #[test]
    fn test_every_backend_roundtrips_and_reports_absence() {
        let temp_dir = TempDir::new().unwrap();
        let mut backends = all_file_backends(&temp_dir);
        backends.push(Box::new(KeyValueBackend::key_value(KeyValueStorage::in_memory())));

        let container = sample_container();
        for backend in &backends {
            assert!(backend.load("C1").unwrap().is_none(), "{}", backend.describe());
            assert!(!backend.exists("C1"));

            backend.save("C1", &container).unwrap();
            assert!(backend.exists("C1"));
            let loaded = backend.load("C1").unwrap().unwrap();
            assert_eq!(loaded, container, "{}", backend.describe());

            backend.delete("C1").unwrap();
            assert!(!backend.exists("C1"));
            assert!(backend.load("C1").unwrap().is_none());
            backend.delete("C1").unwrap();
        }
    }

    #[test]
    fn test_payload_formats() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(
            JsonFileBackend::json_file(temp_dir.path().join("a")).payload_format(),
            PayloadFormat::Text
        );
        assert_eq!(
            BinaryFileBackend::binary_file(temp_dir.path().join("b")).payload_format(),
            PayloadFormat::Binary
        );
        assert_eq!(
            EncryptedFileBackend::encrypted_file(temp_dir.path().join("c")).payload_format(),
            PayloadFormat::Binary
        );
        assert_eq!(
            KeyValueBackend::key_value(KeyValueStorage::in_memory()).payload_format(),
            PayloadFormat::Text
        );
    }

    #[test]
    fn test_key_value_entries_are_per_key() {
        let backend = KeyValueBackend::key_value(KeyValueStorage::in_memory());
        let container = sample_container();

        backend.save("C1", &container).unwrap();
        assert!(backend.load("C2").unwrap().is_none());
        assert!(backend.load("C1").unwrap().is_some());
    }

    #[test]
    fn test_json_file_is_cleartext() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("s.json");
        JsonFileBackend::json_file(&path).save("C1", &sample_container()).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("data_entities"));
        assert!(raw.contains("\"score\\\":100"));
    }

    #[test]
    fn test_corrupt_file_is_codec_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("s.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = JsonFileBackend::json_file(&path).load("C1").unwrap_err();
        match err {
            PersistError::Codec { type_name, .. } => assert!(type_name.contains("DataEntitiesContainer")),
            other => panic!("expected codec error, got {other:?}"),
        }
    }

    #[test]
    fn test_newer_format_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::json_file(temp_dir.path().join("s.json"));
        let mut container = sample_container();
        container.format_version = STORE_FORMAT_VERSION + 1;
        backend.save("C1", &container).unwrap();

        assert!(matches!(backend.load("C1"), Err(PersistError::InvalidFormat(_))));
    }

    #[test]
    fn test_create_backend_from_config() {
        let temp_dir = TempDir::new().unwrap();
        let configs = vec![
            StorageConfig::json_file(temp_dir.path().join("a.json")),
            StorageConfig::binary_file(temp_dir.path().join("b.dat")),
            StorageConfig::encrypted_file(temp_dir.path().join("c.aes")).with_passphrase("pw"),
            StorageConfig::key_value(Some(temp_dir.path().join("kv.json"))),
            StorageConfig::key_value(None),
            StorageConfig::binary_file(temp_dir.path().join("d.dat.gz")).with_compression(true),
        ];

        let container = sample_container();
        for config in configs {
            let backend = create_backend_from_config(config).unwrap();
            backend.save("C1", &container).unwrap();
            assert_eq!(backend.load("C1").unwrap().unwrap(), container);
        }
    }

    #[test]
    fn test_create_backend_rejects_invalid_config() {
        let mut config = StorageConfig::json_file("x.json");
        config.path = None;
        assert!(matches!(
            create_backend_from_config(config),
            Err(PersistError::Configuration(_))
        ));
    }
}
