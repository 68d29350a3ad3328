/*!
The entity registry: snapshots a set of live entities into one store and
restores them in place.
*/

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::entity::{DataEntitiesContainer, DataEntity, Entity, EntityId};
#[cfg(feature = "metrics")]
use crate::observability::OperationTimer;
use crate::{PersistError, Result};

/// Result of [`PersistentContainer::load`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing was ever saved under this container's key
    NotFound,
    /// The store was read; `restored` live entities had a matching record
    Loaded { records: usize, restored: usize },
}

/// Result of [`PersistentContainer::save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// No live entities, the backend was not touched
    Skipped,
    /// The store was written with `records` records
    Saved { records: usize },
}

struct Registration {
    id: EntityId,
    entity: Weak<RefCell<dyn Entity>>,
}

/// Persists the state of a list of entities through one backend
///
/// The container only holds weak references: an entity dropped by its owner
/// is skipped, and its stored record is kept. Records of identities that are
/// no longer registered are kept as well, so saving a partially populated
/// container never loses data.
///
/// # Example
/// ```rust
/// use std::{cell::RefCell, rc::Rc};
/// use persistor_core::{JsonFileBackend, PersistentContainer};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, Default)]
/// struct Player { score: u32 }
///
/// let dir = tempfile::tempdir()?;
/// let player = Rc::new(RefCell::new(Player { score: 100 }));
///
/// let mut container = PersistentContainer::new("C1")
///     .with_backend(JsonFileBackend::json_file(dir.path().join("save.json")));
/// container.register(7, &player)?;
/// container.save()?;
///
/// player.borrow_mut().score = 0;
/// container.load()?;
/// assert_eq!(player.borrow().score, 100);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PersistentContainer {
    key: String,
    backend: Option<Box<dyn Backend>>,
    registrations: Vec<Registration>,
    auto_ids: HashMap<&'static str, usize>,
    data_entities: BTreeMap<EntityId, DataEntity>,
}

impl PersistentContainer {
    /// Create a container storing under logical key `key`, with no backend yet
    pub fn new<K: Into<String>>(key: K) -> Self {
        Self {
            key: key.into(),
            backend: None,
            registrations: Vec::new(),
            auto_ids: HashMap::new(),
            data_entities: BTreeMap::new(),
        }
    }

    /// Attach a backend, builder style
    pub fn with_backend<B: Backend + 'static>(mut self, backend: B) -> Self {
        self.set_backend(backend);
        self
    }

    /// Attach or replace the backend
    pub fn set_backend<B: Backend + 'static>(&mut self, backend: B) {
        self.backend = Some(Box::new(backend));
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Register an entity under an explicit identity
    ///
    /// Fails if another live entity already uses `id`. An identity whose
    /// previous entity has been dropped can be reused.
    pub fn register<T, I>(&mut self, id: I, entity: &Rc<RefCell<T>>) -> Result<()>
    where
        T: Entity + 'static,
        I: Into<EntityId>,
    {
        let id = id.into();
        if let Some(existing) = self.registrations.iter().position(|r| r.id == id) {
            if self.registrations[existing].entity.strong_count() > 0 {
                return Err(PersistError::validation(format!(
                    "Entity id {id} is already registered in container '{}'",
                    self.key
                )));
            }
            self.registrations.remove(existing);
        }

        let entity: Rc<RefCell<dyn Entity>> = entity.clone();
        debug!(key = %self.key, entity_id = %id, "Registered entity");
        self.registrations.push(Registration {
            id,
            entity: Rc::downgrade(&entity),
        });
        Ok(())
    }

    /// Register an entity under a derived identity `"<TypeName>#<n>"`
    ///
    /// `n` counts registrations of the same type on this container, so the
    /// identity is stable as long as entities are registered in the same order.
    pub fn register_auto<T>(&mut self, entity: &Rc<RefCell<T>>) -> Result<EntityId>
    where
        T: Entity + 'static,
    {
        let type_name = short_type_name(std::any::type_name::<T>());
        let next = self.auto_ids.entry(type_name).or_insert(0);
        let id = EntityId::Name(format!("{type_name}#{next}"));
        *next += 1;

        self.register(id.clone(), entity)?;
        Ok(id)
    }

    /// Stop persisting the entity with `id`; its stored record is kept
    pub fn unregister(&mut self, id: &EntityId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| &r.id != id);
        before != self.registrations.len()
    }

    /// Number of registered entities that are still alive
    pub fn live_count(&self) -> usize {
        self.registrations
            .iter()
            .filter(|r| r.entity.strong_count() > 0)
            .count()
    }

    /// The in-memory record for `id`, as of the last load or save
    pub fn record(&self, id: &EntityId) -> Option<&DataEntity> {
        self.data_entities.get(id)
    }

    /// All in-memory records, ordered by identity
    pub fn records(&self) -> impl Iterator<Item = &DataEntity> {
        self.data_entities.values()
    }

    fn backend(&self) -> Result<&dyn Backend> {
        self.backend.as_deref().ok_or_else(|| {
            PersistError::configuration(format!(
                "PersistentContainer '{}' has no backend attached; unable to load or save data",
                self.key
            ))
        })
    }

    fn live_entities(&self) -> Vec<(&EntityId, Rc<RefCell<dyn Entity>>)> {
        let mut live = Vec::with_capacity(self.registrations.len());
        for registration in &self.registrations {
            match registration.entity.upgrade() {
                Some(entity) => live.push((&registration.id, entity)),
                None => warn!(
                    key = %self.key,
                    entity_id = %registration.id,
                    "Registered entity was dropped; skipping"
                ),
            }
        }
        live
    }

    /// Load the store and overwrite every live entity that has a record
    ///
    /// A store that was never written is reported as [`LoadOutcome::NotFound`]
    /// and leaves both the records and the entities untouched. Entities
    /// without a record keep their current state.
    pub fn load(&mut self) -> Result<LoadOutcome> {
        #[cfg(feature = "metrics")]
        let timer = OperationTimer::start();
        let result = self.read_store();
        #[cfg(feature = "metrics")]
        timer.observe(&result);
        result
    }

    fn read_store(&mut self) -> Result<LoadOutcome> {
        let backend = self.backend()?;

        let container = match backend.load(&self.key)? {
            Some(container) => container,
            None => {
                info!(key = %self.key, backend = %backend.describe(), "No stored data; nothing to load");
                return Ok(LoadOutcome::NotFound);
            }
        };

        let records = container.into_map();
        let mut restored = 0;
        for (id, entity) in self.live_entities() {
            let Some(record) = records.get(id) else {
                continue;
            };
            let mut entity = entity.try_borrow_mut().map_err(|_| {
                PersistError::validation(format!("Entity {id} is borrowed and cannot be restored"))
            })?;
            entity.overwrite(&record.payload)?;
            restored += 1;
        }

        let outcome = LoadOutcome::Loaded {
            records: records.len(),
            restored,
        };
        self.data_entities = records;

        #[cfg(feature = "metrics")]
        crate::observability::PersistMetrics::global().record_load();
        info!(key = %self.key, records = self.data_entities.len(), restored, "Loaded container");
        Ok(outcome)
    }

    /// Snapshot every live entity and write the whole store
    ///
    /// Records for identities that are not currently live are written back
    /// unchanged. With no live entities this does nothing, so a misconfigured
    /// container cannot overwrite a good store with an empty one.
    ///
    /// The in-memory records only change once the backend write succeeded.
    pub fn save(&mut self) -> Result<SaveOutcome> {
        #[cfg(feature = "metrics")]
        let timer = OperationTimer::start();
        let result = self.write_store();
        #[cfg(feature = "metrics")]
        timer.observe(&result);
        result
    }

    fn write_store(&mut self) -> Result<SaveOutcome> {
        let backend = self.backend()?;

        let live = self.live_entities();
        if live.is_empty() {
            info!(key = %self.key, "No live entities; skipping save");
            return Ok(SaveOutcome::Skipped);
        }

        let format = backend.payload_format();
        let mut next = self.data_entities.clone();
        for (id, entity) in live {
            let entity = entity.try_borrow().map_err(|_| {
                PersistError::validation(format!("Entity {id} is mutably borrowed and cannot be saved"))
            })?;
            let payload = entity.snapshot(format)?;
            next.insert(
                id.clone(),
                DataEntity {
                    entity_id: id.clone(),
                    payload,
                },
            );
        }

        let container = DataEntitiesContainer::from_map(&next);
        backend.save(&self.key, &container)?;

        let records = next.len();
        info!(key = %self.key, records, backend = %backend.describe(), "Saved container");
        #[cfg(feature = "metrics")]
        crate::observability::PersistMetrics::global().record_save();

        self.data_entities = next;
        Ok(SaveOutcome::Saved { records })
    }

    /// Delete all persisted state for this container
    ///
    /// Removes the backend's store for this key and clears the in-memory
    /// records. Succeeds whether or not anything was stored. Live entities
    /// keep their current state.
    pub fn purge(&mut self) -> Result<()> {
        #[cfg(feature = "metrics")]
        let timer = OperationTimer::start();
        let result = self.clear_store();
        #[cfg(feature = "metrics")]
        timer.observe(&result);
        result
    }

    fn clear_store(&mut self) -> Result<()> {
        let backend = self.backend()?;
        backend.delete(&self.key)?;

        let cleared = self.data_entities.len();
        self.data_entities.clear();

        #[cfg(feature = "metrics")]
        crate::observability::PersistMetrics::global().record_purge();
        info!(key = %self.key, cleared, "Purged container");
        Ok(())
    }
}

impl std::fmt::Debug for PersistentContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentContainer")
            .field("key", &self.key)
            .field("backend", &self.backend.as_ref().map(|b| b.describe()))
            .field("registered", &self.registrations.len())
            .field("records", &self.data_entities.len())
            .finish()
    }
}

/// `my_crate::module::Player<T>` -> `Player<T>`
fn short_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
