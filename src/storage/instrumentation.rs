//! Write-through views over entity attribute containers.
//!
//! Operations receive attribute maps through these wrappers instead of
//! raw copies: every mutation is routed through a single transactional
//! parent-entity update, and reads re-fetch so concurrent writers on
//! other threads stay visible. Nested maps and lists come back wrapped
//! recursively; top-level values are [`Parameter`]-wrapped in the model
//! and unwrapped here.

use indexmap::IndexMap;
use serde_json::Value;

use crate::model::Parameter;
use crate::storage::{Collection, Entity, Error, Result};

#[derive(Debug, Clone)]
pub enum PathKey {
    Key(String),
    Index(usize),
}

/// A value read out of an instrumented container.
#[derive(Debug, Clone)]
pub enum InstrumentedValue<T: Entity> {
    Scalar(Value),
    Map(InstrumentedMap<T>),
    List(InstrumentedList<T>),
}

impl<T: Entity> InstrumentedValue<T> {
    /// The raw JSON value, losing the write-through wrapper.
    pub fn raw(&self) -> Result<Value> {
        match self {
            Self::Scalar(value) => Ok(value.clone()),
            Self::Map(map) => Ok(Value::Object(
                map.to_map()?
                    .into_iter()
                    .collect::<serde_json::Map<String, Value>>(),
            )),
            Self::List(list) => Ok(Value::Array(list.to_vec()?)),
        }
    }
}

fn missing_path(parent_id: &str, field: &str) -> Error {
    Error::Storage {
        message: format!("attribute path no longer exists under {parent_id}.{field}"),
    }
}

/// Resolve the container this wrapper stands for inside the parent
/// document. An empty path addresses the Parameter-wrapped top map.
fn container<'a>(doc: &'a Value, field: &str, path: &[PathKey]) -> Option<&'a Value> {
    let top = doc.get(field)?;
    let Some(first) = path.first() else {
        return Some(top);
    };
    let PathKey::Key(first) = first else {
        return None;
    };
    let mut current = top.get(first)?.get("value")?;
    for segment in &path[1..] {
        current = match segment {
            PathKey::Key(key) => current.get(key)?,
            PathKey::Index(index) => current.get(*index)?,
        };
    }
    Some(current)
}

fn container_mut<'a>(doc: &'a mut Value, field: &str, path: &[PathKey]) -> Option<&'a mut Value> {
    let top = doc.get_mut(field)?;
    let Some(first) = path.first() else {
        return Some(top);
    };
    let PathKey::Key(first) = first else {
        return None;
    };
    let mut current = top.get_mut(first)?.get_mut("value")?;
    for segment in &path[1..] {
        current = match segment {
            PathKey::Key(key) => current.get_mut(key)?,
            PathKey::Index(index) => current.get_mut(*index)?,
        };
    }
    Some(current)
}

fn wrap_child<T: Entity>(
    parent: &InstrumentedMapInner<T>,
    key: PathKey,
    raw: &Value,
) -> InstrumentedValue<T> {
    let mut path = parent.path.clone();
    path.push(key);
    match raw {
        Value::Object(_) => InstrumentedValue::Map(InstrumentedMap {
            inner: InstrumentedMapInner {
                collection: parent.collection.clone(),
                parent_id: parent.parent_id.clone(),
                field: parent.field,
                path,
            },
        }),
        Value::Array(_) => InstrumentedValue::List(InstrumentedList {
            inner: InstrumentedMapInner {
                collection: parent.collection.clone(),
                parent_id: parent.parent_id.clone(),
                field: parent.field,
                path,
            },
        }),
        other => InstrumentedValue::Scalar(other.clone()),
    }
}

#[derive(Debug)]
struct InstrumentedMapInner<T: Entity> {
    collection: Collection<T>,
    parent_id: String,
    field: &'static str,
    path: Vec<PathKey>,
}

impl<T: Entity> Clone for InstrumentedMapInner<T> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            parent_id: self.parent_id.clone(),
            field: self.field,
            path: self.path.clone(),
        }
    }
}

/// Write-through map view.
#[derive(Debug, Clone)]
pub struct InstrumentedMap<T: Entity> {
    inner: InstrumentedMapInner<T>,
}

impl<T: Entity> InstrumentedMap<T> {
    /// View over a top-level attribute field of `parent_id`.
    #[must_use]
    pub fn new(collection: Collection<T>, parent_id: &str, field: &'static str) -> Self {
        Self {
            inner: InstrumentedMapInner {
                collection,
                parent_id: parent_id.to_string(),
                field,
                path: Vec::new(),
            },
        }
    }

    fn is_top_level(&self) -> bool {
        self.inner.path.is_empty()
    }

    pub fn get(&self, key: &str) -> Result<Option<InstrumentedValue<T>>> {
        let doc = self.inner.collection.raw(&self.inner.parent_id)?;
        let Some(map) = container(&doc, self.inner.field, &self.inner.path) else {
            return Ok(None);
        };
        let raw = if self.is_top_level() {
            map.get(key).and_then(|param| param.get("value"))
        } else {
            map.get(key)
        };
        Ok(raw.map(|raw| wrap_child(&self.inner, PathKey::Key(key.to_string()), raw)))
    }

    pub fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.to_map()?.keys().cloned().collect())
    }

    /// Set a key, transactionally updating the parent entity.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let inner = &self.inner;
        let top_level = self.is_top_level();
        inner.collection.update_value(&inner.parent_id, |doc| {
            let map = container_mut(doc, inner.field, &inner.path)
                .ok_or_else(|| missing_path(&inner.parent_id, inner.field))?;
            let map = map.as_object_mut().ok_or_else(|| Error::Storage {
                message: format!("field {} is not a map", inner.field),
            })?;
            if top_level {
                let wrapped = serde_json::to_value(Parameter::wrap(key, value))?;
                map.insert(key.to_string(), wrapped);
            } else {
                map.insert(key.to_string(), value);
            }
            Ok(())
        })?;
        Ok(())
    }

    pub fn update(&self, entries: IndexMap<String, Value>) -> Result<()> {
        for (key, value) in entries {
            self.set(&key, value)?;
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let inner = &self.inner;
        inner.collection.update_value(&inner.parent_id, |doc| {
            if let Some(map) =
                container_mut(doc, inner.field, &inner.path).and_then(Value::as_object_mut)
            {
                map.remove(key);
            }
            Ok(())
        })?;
        Ok(())
    }

    /// A raw snapshot of the whole container (top-level values
    /// unwrapped from their Parameter envelope).
    pub fn to_map(&self) -> Result<IndexMap<String, Value>> {
        let doc = self.inner.collection.raw(&self.inner.parent_id)?;
        let map = container(&doc, self.inner.field, &self.inner.path)
            .and_then(Value::as_object)
            .ok_or_else(|| missing_path(&self.inner.parent_id, self.inner.field))?;
        let mut snapshot = IndexMap::new();
        for (key, value) in map {
            let raw = if self.is_top_level() {
                value.get("value").cloned().unwrap_or(Value::Null)
            } else {
                value.clone()
            };
            snapshot.insert(key.clone(), raw);
        }
        Ok(snapshot)
    }
}

/// Write-through list view; only ever produced by reading a nested
/// array out of an [`InstrumentedMap`].
#[derive(Debug, Clone)]
pub struct InstrumentedList<T: Entity> {
    inner: InstrumentedMapInner<T>,
}

impl<T: Entity> InstrumentedList<T> {
    pub fn get(&self, index: usize) -> Result<Option<InstrumentedValue<T>>> {
        let doc = self.inner.collection.raw(&self.inner.parent_id)?;
        let Some(list) = container(&doc, self.inner.field, &self.inner.path) else {
            return Ok(None);
        };
        Ok(list
            .get(index)
            .map(|raw| wrap_child(&self.inner, PathKey::Index(index), raw)))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.to_vec()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.to_vec()?.is_empty())
    }

    pub fn set(&self, index: usize, value: Value) -> Result<()> {
        let inner = &self.inner;
        inner.collection.update_value(&inner.parent_id, |doc| {
            let list = container_mut(doc, inner.field, &inner.path)
                .and_then(Value::as_array_mut)
                .ok_or_else(|| missing_path(&inner.parent_id, inner.field))?;
            if index >= list.len() {
                return Err(Error::Storage {
                    message: format!("list index {index} out of bounds"),
                });
            }
            list[index] = value;
            Ok(())
        })?;
        Ok(())
    }

    pub fn push(&self, value: Value) -> Result<()> {
        let inner = &self.inner;
        inner.collection.update_value(&inner.parent_id, |doc| {
            let list = container_mut(doc, inner.field, &inner.path)
                .and_then(Value::as_array_mut)
                .ok_or_else(|| missing_path(&inner.parent_id, inner.field))?;
            list.push(value);
            Ok(())
        })?;
        Ok(())
    }

    pub fn to_vec(&self) -> Result<Vec<Value>> {
        let doc = self.inner.collection.raw(&self.inner.parent_id)?;
        container(&doc, self.inner.field, &self.inner.path)
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| missing_path(&self.inner.parent_id, self.inner.field))
    }
}
