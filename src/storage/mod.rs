//! Transactional key-addressable model storage.
//!
//! Entities are stored as JSON documents under `(table, id)` keys. A
//! [`StorageBackend`] supplies the raw document operations; typed
//! [`Collection`]s sit on top and [`ModelStorage`] aggregates one
//! collection per entity. Every engine state transition goes through
//! [`Collection::update_with`], which is a single backend transaction.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::model::{Execution, Node, Plugin, Relationship, ServiceInstance, TaskRecord};

pub mod instrumentation;
pub mod mem;
pub mod redb_store;
pub mod resource;

pub use instrumentation::{InstrumentedList, InstrumentedMap, InstrumentedValue};
pub use mem::InMemoryBackend;
pub use redb_store::RedbBackend;
pub use resource::{ResourceBucket, ResourceStorage};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Storage error: {message}"))]
    Storage { message: String },

    #[snafu(display("Database error: {message}"))]
    Database { message: String },

    #[snafu(display("Serialization error: {source}"))]
    Serialization { source: serde_json::Error },

    #[snafu(display("{table} not found: {id}"))]
    NotFound { table: &'static str, id: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Error::Serialization { source }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Storage {
            message: format!("I/O error: {source}"),
        }
    }
}

/// A storable entity. `TABLE` plays the role the model class reference
/// plays in a reflective store; `NAME_FIELD` is the lookup column used
/// by [`Collection::get_by_name`].
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    const NAME_FIELD: &'static str = "name";

    fn id(&self) -> &str;
}

impl Entity for Node {
    const TABLE: &'static str = "node";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Relationship {
    const TABLE: &'static str = "relationship";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Plugin {
    const TABLE: &'static str = "plugin";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for ServiceInstance {
    const TABLE: &'static str = "service_instance";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Execution {
    const TABLE: &'static str = "execution";
    const NAME_FIELD: &'static str = "workflow_name";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for TaskRecord {
    const TABLE: &'static str = "task";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Raw document store. Implementations must make `update` atomic with
/// respect to concurrent callers; that atomicity is what the engine
/// relies on for its one-transaction-per-transition contract.
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    fn get(&self, table: &'static str, id: &str) -> Result<Option<serde_json::Value>>;
    fn put(&self, table: &'static str, id: &str, doc: serde_json::Value) -> Result<()>;
    fn remove(&self, table: &'static str, id: &str) -> Result<()>;
    fn list(&self, table: &'static str) -> Result<Vec<serde_json::Value>>;

    /// Atomic read-modify-write of a single document.
    fn update(
        &self,
        table: &'static str,
        id: &str,
        apply: &mut dyn FnMut(serde_json::Value) -> Result<serde_json::Value>,
    ) -> Result<serde_json::Value>;

    /// A serializable description of this backend, sufficient for a
    /// child process to reopen a handle to the same store.
    fn spec(&self) -> StorageSpec;
}

/// Serializable backend locator, used by the subprocess executor to
/// reconstruct a context on the other side of a process boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageSpec {
    /// In-memory stores cannot be shared across processes; reopening
    /// yields a fresh empty store. Cross-process contexts should use the
    /// ctx proxy or a durable backend.
    Memory,
    Redb { path: PathBuf },
}

impl StorageSpec {
    pub fn open(&self) -> Result<Arc<dyn StorageBackend>> {
        match self {
            Self::Memory => Ok(Arc::new(InMemoryBackend::new())),
            Self::Redb { path } => Ok(Arc::new(RedbBackend::open(path)?)),
        }
    }
}

/// Typed view over one entity table.
pub struct Collection<T: Entity> {
    backend: Arc<dyn StorageBackend>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            _marker: PhantomData,
        }
    }
}

impl<T: Entity> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").field("table", &T::TABLE).finish()
    }
}

impl<T: Entity> Collection<T> {
    fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            _marker: PhantomData,
        }
    }

    pub fn get(&self, id: &str) -> Result<T> {
        let doc = self.backend.get(T::TABLE, id)?.context(NotFoundSnafu {
            table: T::TABLE,
            id: id.to_string(),
        })?;
        Ok(serde_json::from_value(doc)?)
    }

    pub fn try_get(&self, id: &str) -> Result<Option<T>> {
        match self.backend.get(T::TABLE, id)? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub fn get_by_name(&self, name: &str) -> Result<T> {
        for doc in self.backend.list(T::TABLE)? {
            if doc.get(T::NAME_FIELD).and_then(serde_json::Value::as_str) == Some(name) {
                return Ok(serde_json::from_value(doc)?);
            }
        }
        NotFoundSnafu {
            table: T::TABLE,
            id: name.to_string(),
        }
        .fail()
    }

    pub fn list(&self) -> Result<Vec<T>> {
        self.backend
            .list(T::TABLE)?
            .into_iter()
            .map(|doc| Ok(serde_json::from_value(doc)?))
            .collect()
    }

    /// List entities whose serialized fields equal every given filter.
    pub fn iter_filtered(
        &self,
        filters: &[(&str, serde_json::Value)],
    ) -> Result<Vec<T>> {
        let mut matched = Vec::new();
        for doc in self.backend.list(T::TABLE)? {
            if filters
                .iter()
                .all(|(field, expected)| doc.get(*field) == Some(expected))
            {
                matched.push(serde_json::from_value(doc)?);
            }
        }
        Ok(matched)
    }

    pub fn put(&self, entity: &T) -> Result<()> {
        self.backend
            .put(T::TABLE, entity.id(), serde_json::to_value(entity)?)
    }

    /// Overwrite an existing entity; the entity must already be stored.
    pub fn update(&self, entity: &T) -> Result<()> {
        let id = entity.id().to_string();
        let doc = serde_json::to_value(entity)?;
        self.backend
            .update(T::TABLE, &id, &mut |_| Ok(doc.clone()))?;
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.backend.remove(T::TABLE, id)
    }

    /// Atomic typed read-modify-write: the closure runs inside a single
    /// backend transaction and the result is returned as re-read.
    pub fn update_with(
        &self,
        id: &str,
        apply: impl FnOnce(&mut T) -> Result<()>,
    ) -> Result<T> {
        let mut apply = Some(apply);
        let doc = self.backend.update(T::TABLE, id, &mut |doc| {
            let mut entity: T = serde_json::from_value(doc)?;
            if let Some(apply) = apply.take() {
                apply(&mut entity)?;
            }
            Ok(serde_json::to_value(&entity)?)
        })?;
        Ok(serde_json::from_value(doc)?)
    }

    /// Atomic read-modify-write at the raw document level. Used by the
    /// instrumented containers to patch nested fields.
    pub fn update_value(
        &self,
        id: &str,
        apply: impl FnOnce(&mut serde_json::Value) -> Result<()>,
    ) -> Result<serde_json::Value> {
        let mut apply = Some(apply);
        self.backend.update(T::TABLE, id, &mut |mut doc| {
            if let Some(apply) = apply.take() {
                apply(&mut doc)?;
            }
            Ok(doc)
        })
    }

    pub(crate) fn raw(&self, id: &str) -> Result<serde_json::Value> {
        self.backend.get(T::TABLE, id)?.context(NotFoundSnafu {
            table: T::TABLE,
            id: id.to_string(),
        })
    }
}

/// All model collections over one shared backend.
#[derive(Debug, Clone)]
pub struct ModelStorage {
    backend: Arc<dyn StorageBackend>,
    pub node: Collection<Node>,
    pub relationship: Collection<Relationship>,
    pub plugin: Collection<Plugin>,
    pub service_instance: Collection<ServiceInstance>,
    pub execution: Collection<Execution>,
    pub task: Collection<TaskRecord>,
}

impl ModelStorage {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            node: Collection::new(Arc::clone(&backend)),
            relationship: Collection::new(Arc::clone(&backend)),
            plugin: Collection::new(Arc::clone(&backend)),
            service_instance: Collection::new(Arc::clone(&backend)),
            execution: Collection::new(Arc::clone(&backend)),
            task: Collection::new(Arc::clone(&backend)),
            backend,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    #[must_use]
    pub fn spec(&self) -> StorageSpec {
        self.backend.spec()
    }

    pub fn from_spec(spec: &StorageSpec) -> Result<Self> {
        Ok(Self::new(spec.open()?))
    }
}
