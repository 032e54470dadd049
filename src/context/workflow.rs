use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::Notify;

use crate::events::SignalHub;
use crate::model::{Execution, ExecutionStatus, Node, ServiceInstance};
use crate::storage::{ModelStorage, ResourceStorage};

use super::{Error, Result};

/// Defaults applied to operation tasks that don't specify their own
/// retry policy, plus everything else a workflow function may need
/// while building its graph.
#[derive(Debug, Clone)]
pub struct WorkflowContextOptions {
    pub parameters: IndexMap<String, Value>,
    pub workdir: Option<PathBuf>,
    pub task_max_attempts: i32,
    pub task_retry_interval: Duration,
    pub task_ignore_failure: bool,
    pub hub: SignalHub,
}

impl Default for WorkflowContextOptions {
    fn default() -> Self {
        Self {
            parameters: IndexMap::new(),
            workdir: None,
            task_max_attempts: 1,
            task_retry_interval: Duration::ZERO,
            task_ignore_failure: false,
            hub: SignalHub::new(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    workflow_name: String,
    execution_id: String,
    service_instance_id: String,
    model: ModelStorage,
    resource: ResourceStorage,
    workdir: PathBuf,
    parameters: IndexMap<String, Value>,
    task_max_attempts: i32,
    task_retry_interval: Duration,
    task_ignore_failure: bool,
    hub: SignalHub,
    cancelled: Arc<AtomicBool>,
    cancel_notify: Arc<Notify>,
}

/// Context used while building the task graph and driving the
/// execution. Cheap to clone; all clones share the same state.
///
/// The context id is the execution id.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    inner: Arc<Inner>,
}

impl WorkflowContext {
    /// Create the context and its pending [`Execution`] record.
    pub fn create(
        model: ModelStorage,
        resource: ResourceStorage,
        service_instance_id: &str,
        workflow_name: &str,
        options: WorkflowContextOptions,
    ) -> Result<Self> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let execution = Execution::new(
            execution_id.clone(),
            service_instance_id.to_string(),
            workflow_name.to_string(),
            options.parameters.clone(),
        );
        model.execution.put(&execution)?;

        let workdir = options.workdir.unwrap_or_else(|| {
            std::env::temp_dir().join("weaver").join(&execution_id)
        });

        Ok(Self {
            inner: Arc::new(Inner {
                workflow_name: workflow_name.to_string(),
                execution_id,
                service_instance_id: service_instance_id.to_string(),
                model,
                resource,
                workdir,
                parameters: options.parameters,
                task_max_attempts: options.task_max_attempts,
                task_retry_interval: options.task_retry_interval,
                task_ignore_failure: options.task_ignore_failure,
                hub: options.hub,
                cancelled: Arc::new(AtomicBool::new(false)),
                cancel_notify: Arc::new(Notify::new()),
            }),
        })
    }

    /// The context id, which is the execution id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.execution_id
    }

    #[must_use]
    pub fn workflow_name(&self) -> &str {
        &self.inner.workflow_name
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
    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.inner.parameters
    }

    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.inner.workdir
    }

    #[must_use]
    pub fn hub(&self) -> &SignalHub {
        &self.inner.hub
    }

    #[must_use]
    pub fn service_instance_id(&self) -> &str {
        &self.inner.service_instance_id
    }

    pub fn service_instance(&self) -> Result<ServiceInstance> {
        Ok(self
            .inner
            .model
            .service_instance
            .get(&self.inner.service_instance_id)?)
    }

    /// The nodes of this service instance.
    pub fn nodes(&self) -> Result<Vec<Node>> {
        Ok(self.inner.model.node.iter_filtered(&[(
            "service_instance_id",
            Value::String(self.inner.service_instance_id.clone()),
        )])?)
    }

    pub fn execution(&self) -> Result<Execution> {
        Ok(self.inner.model.execution.get(&self.inner.execution_id)?)
    }

    #[must_use]
    pub fn task_max_attempts(&self) -> i32 {
        self.inner.task_max_attempts
    }

    #[must_use]
    pub fn task_retry_interval(&self) -> Duration {
        self.inner.task_retry_interval
    }

    #[must_use]
    pub fn task_ignore_failure(&self) -> bool {
        self.inner.task_ignore_failure
    }

    // Cancellation is cooperative: the flag is shared with every
    // operation context spawned for this execution.

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        // notify_one stores a permit for a waiter that hasn't arrived
        // yet; notify_waiters wakes everyone already parked.
        self.inner.cancel_notify.notify_one();
        self.inner.cancel_notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.inner.cancelled)
    }

    pub(crate) fn cancel_notify(&self) -> Arc<Notify> {
        Arc::clone(&self.inner.cancel_notify)
    }

    pub(crate) fn mark_execution_started(&self) -> Result<()> {
        self.inner
            .model
            .execution
            .update_with(&self.inner.execution_id, |execution| {
                execution.mark_started();
                Ok(())
            })?;
        Ok(())
    }

    pub(crate) fn mark_execution_terminal(
        &self,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<()> {
        self.inner
            .model
            .execution
            .update_with(&self.inner.execution_id, |execution| {
                execution.mark_terminal(status, error.clone());
                Ok(())
            })?;
        Ok(())
    }
}

/// The scoped current-context stack.
///
/// Entering a scope pushes a context; dropping the guard restores the
/// previous top on all exit paths, including unwinding.
pub mod current {
    use std::cell::RefCell;
    use std::marker::PhantomData;

    use super::super::{Error, Result};
    use super::WorkflowContext;

    thread_local! {
        static STACK: RefCell<Vec<WorkflowContext>> = const { RefCell::new(Vec::new()) };
    }

    /// Restores the previous context top when dropped.
    pub struct ContextGuard {
        // Not Send: the guard must drop on the thread that pushed.
        _not_send: PhantomData<*const ()>,
    }

    impl Drop for ContextGuard {
        fn drop(&mut self) {
            STACK.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }

    #[must_use]
    pub fn push(ctx: &WorkflowContext) -> ContextGuard {
        STACK.with(|stack| stack.borrow_mut().push(ctx.clone()));
        ContextGuard {
            _not_send: PhantomData,
        }
    }

    /// The active workflow context of this thread.
    pub fn get() -> Result<WorkflowContext> {
        STACK.with(|stack| stack.borrow().last().cloned().ok_or(Error::ContextMissing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ModelStorage;

    fn context() -> WorkflowContext {
        let model = ModelStorage::in_memory();
        let dir = std::env::temp_dir().join("weaver-ctx-tests");
        let resource = ResourceStorage::new(dir).unwrap();
        let service = crate::model::ServiceInstance {
            id: "s1".into(),
            name: "svc".into(),
            service_template_id: "t1".into(),
        };
        model.service_instance.put(&service).unwrap();
        WorkflowContext::create(
            model,
            resource,
            "s1",
            "install",
            WorkflowContextOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn current_scope_restores_previous_context() {
        let outer = context();
        let inner = context();
        let _outer_guard = current::push(&outer);
        {
            let _inner_guard = current::push(&inner);
            assert_eq!(current::get().unwrap().id(), inner.id());
        }
        assert_eq!(current::get().unwrap().id(), outer.id());
    }

    #[test]
    fn current_outside_any_scope_is_an_error() {
        assert!(matches!(current::get(), Err(Error::ContextMissing)));
    }
}
