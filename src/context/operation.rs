use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::model::{Actor, Node, Relationship, TaskRecord};
use crate::storage::{
    InstrumentedMap, ModelStorage, ResourceStorage, StorageSpec,
};

use super::{Error, Result};

#[derive(Debug)]
struct Inner {
    name: String,
    task_id: String,
    actor: Actor,
    execution_id: String,
    service_instance_id: String,
    model: ModelStorage,
    resource: ResourceStorage,
    workdir: PathBuf,
    cancelled: Arc<AtomicBool>,
}

/// Context handed to an operation implementation, one per attempt.
///
/// The task record is re-fetched from the store on every access rather
/// than cached: the record may be transitioned by the engine on another
/// thread between calls.
#[derive(Debug, Clone)]
pub struct OperationContext {
    inner: Arc<Inner>,
}

impl OperationContext {
    #[must_use]
    pub fn new(
        name: &str,
        task_id: &str,
        actor: Actor,
        execution_id: &str,
        service_instance_id: &str,
        model: ModelStorage,
        resource: ResourceStorage,
        workdir: PathBuf,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                task_id: task_id.to_string(),
                actor,
                execution_id: execution_id.to_string(),
                service_instance_id: service_instance_id.to_string(),
                model,
                resource,
                workdir,
                cancelled,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.inner.task_id
    }

    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.inner.execution_id
    }

    #[must_use]
    pub fn actor(&self) -> &Actor {
        &self.inner.actor
    }

    #[must_use]
    pub fn model(&self) -> &ModelStorage {
        &self.inner.model
    }

    #[must_use]
    pub fn resource(&self) -> &ResourceStorage {
        &self.inner.resource
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// The task record, fetched fresh from the store.
    pub fn task(&self) -> Result<TaskRecord> {
        Ok(self.inner.model.task.get(&self.inner.task_id)?)
    }

    /// The node this operation acts on. For relationship operations
    /// this is the source node.
    pub fn node(&self) -> Result<Node> {
        match &self.inner.actor {
            Actor::Node { id } => Ok(self.inner.model.node.get(id)?),
            Actor::Relationship { .. } => self.source_node(),
        }
    }

    pub fn relationship(&self) -> Result<Relationship> {
        match &self.inner.actor {
            Actor::Relationship { id } => Ok(self.inner.model.relationship.get(id)?),
            Actor::Node { .. } => Err(Error::Context {
                message: format!("operation {} acts on a node", self.inner.name),
            }),
        }
    }

    pub fn source_node(&self) -> Result<Node> {
        let relationship = self.relationship()?;
        Ok(self.inner.model.node.get(&relationship.source_node_id)?)
    }

    pub fn target_node(&self) -> Result<Node> {
        let relationship = self.relationship()?;
        Ok(self.inner.model.node.get(&relationship.target_node_id)?)
    }

    /// Write-through view of the actor node's attributes.
    pub fn node_attributes(&self) -> Result<InstrumentedMap<Node>> {
        let node = self.node()?;
        Ok(InstrumentedMap::new(
            self.inner.model.node.clone(),
            &node.id,
            "attributes",
        ))
    }

    /// Write-through view of the actor relationship's attributes.
    pub fn relationship_attributes(&self) -> Result<InstrumentedMap<Relationship>> {
        let relationship = self.relationship()?;
        Ok(InstrumentedMap::new(
            self.inner.model.relationship.clone(),
            &relationship.id,
            "attributes",
        ))
    }

    /// A work directory unique to the task's plugin and this service
    /// instance, created on demand. `None` for plugin-less operations.
    pub fn plugin_workdir(&self) -> Result<Option<PathBuf>> {
        let task = self.task()?;
        let Some(plugin_name) = task.plugin_name else {
            return Ok(None);
        };
        let workdir = self
            .inner
            .workdir
            .join("plugins")
            .join(&self.inner.service_instance_id)
            .join(plugin_name);
        std::fs::create_dir_all(&workdir).map_err(|e| Error::Context {
            message: format!("failed to create plugin workdir: {e}"),
        })?;
        Ok(Some(workdir))
    }

    /// Download a resource, trying the deployment bucket first and
    /// falling back to the blueprint bucket on a storage miss.
    pub fn download_resource(&self, destination: &Path, path: Option<&str>) -> Result<()> {
        let deployment = self.inner.resource.deployment().download(
            &self.inner.service_instance_id,
            destination,
            path,
        );
        match deployment {
            Ok(()) => Ok(()),
            Err(crate::storage::Error::Storage { .. }) => {
                let template_id = self.service_template_id()?;
                Ok(self
                    .inner
                    .resource
                    .blueprint()
                    .download(&template_id, destination, path)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read a resource, with the same deployment-then-blueprint
    /// fall-through as [`download_resource`](Self::download_resource).
    pub fn get_resource(&self, path: &str) -> Result<Vec<u8>> {
        match self
            .inner
            .resource
            .deployment()
            .read(&self.inner.service_instance_id, path)
        {
            Ok(content) => Ok(content),
            Err(crate::storage::Error::Storage { .. }) => {
                let template_id = self.service_template_id()?;
                Ok(self.inner.resource.blueprint().read(&template_id, path)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn service_template_id(&self) -> Result<String> {
        Ok(self
            .inner
            .model
            .service_instance
            .get(&self.inner.service_instance_id)?
            .service_template_id)
    }

    /// A serializable description of this context, sufficient for a
    /// child process to reconstruct a handle against the same stores.
    #[must_use]
    pub fn serialized(&self) -> SerializedOperationContext {
        SerializedOperationContext {
            name: self.inner.name.clone(),
            task_id: self.inner.task_id.clone(),
            actor: self.inner.actor.clone(),
            execution_id: self.inner.execution_id.clone(),
            service_instance_id: self.inner.service_instance_id.clone(),
            workdir: self.inner.workdir.clone(),
            model: self.inner.model.spec(),
            resource_root: self.inner.resource.root().to_path_buf(),
        }
    }

    pub fn from_serialized(serialized: SerializedOperationContext) -> Result<Self> {
        let model = ModelStorage::from_spec(&serialized.model)?;
        let resource = ResourceStorage::new(serialized.resource_root)?;
        Ok(Self::new(
            &serialized.name,
            &serialized.task_id,
            serialized.actor,
            &serialized.execution_id,
            &serialized.service_instance_id,
            model,
            resource,
            serialized.workdir,
            Arc::new(AtomicBool::new(false)),
        ))
    }
}

/// Wire form of an operation context for subprocess executors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedOperationContext {
    pub name: String,
    pub task_id: String,
    pub actor: Actor,
    pub execution_id: String,
    pub service_instance_id: String,
    pub workdir: PathBuf,
    pub model: StorageSpec,
    pub resource_root: PathBuf,
}
