/*!
# Persistor Core Engine

Pluggable object persistence. A [`PersistentContainer`] snapshots the state
of a set of registered entities, encodes each one independently, stores the
aggregate under a single logical key through an interchangeable
[`Backend`], and later restores every entity's state in place.

- Entity identity is explicit and survives save/load cycles
- Backends: cleartext JSON file, MessagePack file, AES-128 encrypted file,
  key-value table
- Records of entities that are no longer registered are never dropped

## Architecture

The core follows hexagonal architecture principles:
- [`StorageAdapter`]s move bytes (file, encrypted file, key-value table)
- [`Codec`]s turn stores and entity state into bytes (JSON, MessagePack)
- [`StorageBackend`] composes the two, optionally with gzip compression
- The container owns identity and the save/load protocol

## Usage

```rust
use std::{cell::RefCell, rc::Rc};
use persistor_core::{create_backend_from_config, LoadOutcome, PersistentContainer, StorageConfig};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Default)]
struct Player { id: u32, score: u32 }

let dir = tempfile::tempdir()?;
let backend = create_backend_from_config(StorageConfig::encrypted_file(dir.path().join("save.aes")))?;

let player = Rc::new(RefCell::new(Player { id: 7, score: 100 }));
let mut container = PersistentContainer::new("C1").with_backend(backend);
container.register(7, &player)?;

assert_eq!(container.load()?, LoadOutcome::NotFound);
container.save()?;

player.borrow_mut().score = 0;
container.load()?;
assert_eq!(player.borrow().score, 100);
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

pub mod backend;
pub mod codec;
pub mod compression;
pub mod config;
pub mod container;
pub mod entity;
pub mod error;
pub mod observability;
pub mod storage;


pub use backend::{
    create_backend_from_config, Backend, BinaryFileBackend, EncryptedFileBackend, JsonFileBackend,
    KeyValueBackend, StorageBackend,
};
pub use codec::{Codec, JsonCodec, MessagePackCodec, Payload, PayloadFormat};
pub use compression::{CompressionAdapter, GzipCompressor, NoCompression};
pub use config::{BackendKind, StorageConfig};
pub use container::{LoadOutcome, PersistentContainer, SaveOutcome};
pub use entity::{DataEntitiesContainer, DataEntity, Entity, EntityId, STORE_FORMAT_VERSION};
pub use error::{PersistError, Result};
pub use storage::{EncryptedStorage, FileStorage, KeyValueStorage, StorageAdapter};
