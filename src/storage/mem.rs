use std::collections::HashMap;
use std::sync::Mutex;

use indexmap::IndexMap;

use crate::storage::{Error, Result, StorageBackend, StorageSpec};

/// In-memory storage backend. Suitable for tests and ephemeral runs;
/// not shared across processes.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tables: Mutex<HashMap<&'static str, IndexMap<String, serde_json::Value>>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for InMemoryBackend {
    fn get(&self, table: &'static str, id: &str) -> Result<Option<serde_json::Value>> {
        let tables = self
            .tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(tables.get(table).and_then(|rows| rows.get(id)).cloned())
    }

    fn put(&self, table: &'static str, id: &str, doc: serde_json::Value) -> Result<()> {
        let mut tables = self
            .tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tables.entry(table).or_default().insert(id.to_string(), doc);
        Ok(())
    }

    fn remove(&self, table: &'static str, id: &str) -> Result<()> {
        let mut tables = self
            .tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(rows) = tables.get_mut(table) {
            rows.shift_remove(id);
        }
        Ok(())
    }

    fn list(&self, table: &'static str) -> Result<Vec<serde_json::Value>> {
        let tables = self
            .tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    fn update(
        &self,
        table: &'static str,
        id: &str,
        apply: &mut dyn FnMut(serde_json::Value) -> Result<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        // The table lock is held across read-apply-write, which is the
        // whole transaction for this backend.
        let mut tables = self
            .tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let rows = tables.entry(table).or_default();
        let current = rows.get(id).cloned().ok_or_else(|| Error::Storage {
            message: format!("cannot update missing document {table}:{id}"),
        })?;
        let updated = apply(current)?;
        rows.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    fn spec(&self) -> StorageSpec {
        StorageSpec::Memory
    }
}
