/*!
Entities, their identities, and the records a store is made of.
*/

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

use crate::codec::{overwrite_in_place, Payload, PayloadFormat};
use crate::{PersistError, Result};

/// Current store format version for compatibility tracking
pub const STORE_FORMAT_VERSION: u8 = 1;

/// Stable identity of an entity within one container
///
/// Callers pick it at registration time, so it survives process restarts as
/// long as the caller keeps choosing the same value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Name(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(id) => write!(f, "{id}"),
            EntityId::Name(name) => f.write_str(name),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Int(id)
    }
}

impl From<i32> for EntityId {
    fn from(id: i32) -> Self {
        EntityId::Int(id.into())
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        EntityId::Int(id.into())
    }
}

impl From<&str> for EntityId {
    fn from(name: &str) -> Self {
        EntityId::Name(name.to_string())
    }
}

impl From<String> for EntityId {
    fn from(name: String) -> Self {
        EntityId::Name(name)
    }
}

/// A stateful object whose state a container snapshots and restores
///
/// Implemented for every `Serialize + DeserializeOwned` type. Restoring goes
/// through [`Entity::overwrite`], which mutates the existing value so any
/// handle to it stays valid.
pub trait Entity {
    /// Rust type name, used in diagnostics
    fn type_name(&self) -> &'static str;

    /// Encode the current state
    fn snapshot(&self, format: PayloadFormat) -> Result<Payload>;

    /// Replace the current state with the stored one, in place
    fn overwrite(&mut self, payload: &Payload) -> Result<()>;
}

impl<T> Entity for T
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn snapshot(&self, format: PayloadFormat) -> Result<Payload> {
        format.encode(self)
    }

    fn overwrite(&mut self, payload: &Payload) -> Result<()> {
        overwrite_in_place(self, payload)
    }
}

/// One entity's persisted state
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataEntity {
    pub entity_id: EntityId,
    pub payload: Payload,
}

/// The unit a backend stores under one logical key
///
/// Record order carries no meaning; identity is the only key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataEntitiesContainer {
    /// Format version for compatibility (current: 1)
    pub format_version: u8,

    /// When the store was written
    pub saved_at: DateTime<Utc>,

    pub data_entities: Vec<DataEntity>,
}

impl DataEntitiesContainer {
    /// Wrap records into a container stamped with the current time
    pub fn new(data_entities: Vec<DataEntity>) -> Self {
        Self {
            format_version: STORE_FORMAT_VERSION,
            saved_at: Utc::now(),
            data_entities,
        }
    }

    /// Build a container from the registry's identity map
    pub fn from_map(records: &BTreeMap<EntityId, DataEntity>) -> Self {
        Self::new(records.values().cloned().collect())
    }

    /// Check if this store can be read by the current library version
    pub fn is_compatible(&self) -> bool {
        self.format_version <= STORE_FORMAT_VERSION
    }

    pub fn ensure_compatible(&self) -> Result<()> {
        if self.is_compatible() {
            Ok(())
        } else {
            Err(PersistError::invalid_format(format!(
                "Incompatible store format version: {} (current: {})",
                self.format_version, STORE_FORMAT_VERSION
            )))
        }
    }

    /// Find a record by identity
    pub fn get(&self, entity_id: &EntityId) -> Option<&DataEntity> {
        self.data_entities
            .iter()
            .rev()
            .find(|record| &record.entity_id == entity_id)
    }

    /// Index records by identity. A duplicated identity keeps the last record.
    pub fn into_map(self) -> BTreeMap<EntityId, DataEntity> {
        let mut map = BTreeMap::new();
        for record in self.data_entities {
            let entity_id = record.entity_id.clone();
            if map.insert(entity_id.clone(), record).is_some() {
                warn!(entity_id = %entity_id, "Store holds duplicate records for entity; keeping the last");
            }
        }
        map
    }
}
