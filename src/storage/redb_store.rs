use std::path::{Path, PathBuf};

use crate::storage::{Error, Result, StorageBackend, StorageSpec};
use redb::ReadableTable;

/// Durable storage backend over an embedded redb database.
///
/// All documents live in a single table keyed `"{table}:{id}"`; every
/// mutation is one write transaction, which gives [`StorageBackend`]'s
/// atomic `update` for free.
#[derive(Debug)]
pub struct RedbBackend {
    db: redb::Database,
    path: PathBuf,
}

const MODELS_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("models");

fn db_error(context: &str, error: impl std::fmt::Display) -> Error {
    Error::Database {
        message: format!("{context}: {error}"),
    }
}

impl RedbBackend {
    /// Create or open the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = redb::Database::create(&path)
            .map_err(|e| db_error("failed to open database", e))?;
        let write_txn = db
            .begin_write()
            .map_err(|e| db_error("failed to begin write transaction", e))?;
        {
            write_txn
                .open_table(MODELS_TABLE)
                .map_err(|e| db_error("failed to open models table", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| db_error("failed to commit transaction", e))?;
        Ok(Self { db, path })
    }

    fn key(table: &str, id: &str) -> String {
        format!("{table}:{id}")
    }

    fn read(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| db_error("failed to begin read transaction", e))?;
        let table = read_txn
            .open_table(MODELS_TABLE)
            .map_err(|e| db_error("failed to open models table", e))?;
        match table
            .get(key)
            .map_err(|e| db_error("failed to read document", e))?
        {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }
}

impl StorageBackend for RedbBackend {
    fn get(&self, table: &'static str, id: &str) -> Result<Option<serde_json::Value>> {
        self.read(&Self::key(table, id))
    }

    fn put(&self, table: &'static str, id: &str, doc: serde_json::Value) -> Result<()> {
        let key = Self::key(table, id);
        let value = serde_json::to_vec(&doc)?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_error("failed to begin write transaction", e))?;
        {
            let mut table = write_txn
                .open_table(MODELS_TABLE)
                .map_err(|e| db_error("failed to open models table", e))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(|e| db_error("failed to insert document", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| db_error("failed to commit transaction", e))?;
        Ok(())
    }

    fn remove(&self, table: &'static str, id: &str) -> Result<()> {
        let key = Self::key(table, id);
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_error("failed to begin write transaction", e))?;
        {
            let mut table = write_txn
                .open_table(MODELS_TABLE)
                .map_err(|e| db_error("failed to open models table", e))?;
            table
                .remove(key.as_str())
                .map_err(|e| db_error("failed to remove document", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| db_error("failed to commit transaction", e))?;
        Ok(())
    }

    fn list(&self, table: &'static str) -> Result<Vec<serde_json::Value>> {
        let prefix = format!("{table}:");
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| db_error("failed to begin read transaction", e))?;
        let models = read_txn
            .open_table(MODELS_TABLE)
            .map_err(|e| db_error("failed to open models table", e))?;
        let mut docs = Vec::new();
        let range = models
            .range::<&str>(..)
            .map_err(|e| db_error("failed to create range", e))?;
        for item in range {
            let (key, value) = item.map_err(|e| db_error("failed to read item", e))?;
            if key.value().starts_with(&prefix) {
                docs.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(docs)
    }

    fn update(
        &self,
        table: &'static str,
        id: &str,
        apply: &mut dyn FnMut(serde_json::Value) -> Result<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let key = Self::key(table, id);
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_error("failed to begin write transaction", e))?;
        let updated = {
            let mut models = write_txn
                .open_table(MODELS_TABLE)
                .map_err(|e| db_error("failed to open models table", e))?;
            let current = match models
                .get(key.as_str())
                .map_err(|e| db_error("failed to read document", e))?
            {
                Some(value) => serde_json::from_slice(value.value())?,
                None => {
                    return Err(Error::Storage {
                        message: format!("cannot update missing document {key}"),
                    });
                }
            };
            let updated = apply(current)?;
            let bytes = serde_json::to_vec(&updated)?;
            models
                .insert(key.as_str(), bytes.as_slice())
                .map_err(|e| db_error("failed to insert document", e))?;
            updated
        };
        write_txn
            .commit()
            .map_err(|e| db_error("failed to commit transaction", e))?;
        Ok(updated)
    }

    fn spec(&self) -> StorageSpec {
        StorageSpec::Redb {
            path: self.path.clone(),
        }
    }
}
