//! Tasks of the execution graph.

use crate::api::task::OperationTask;

/// A node of the execution graph. Sentinels have no side effect; they
/// exist so a (sub-)workflow behaves as one composable unit at its
/// boundaries and lifecycle events look the same at every scope.
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    pub id: String,
    pub name: String,
    pub kind: ExecutionTaskKind,
}

#[derive(Debug, Clone)]
pub enum ExecutionTaskKind {
    StartWorkflow,
    EndWorkflow,
    StartSubWorkflow,
    EndSubWorkflow,
    Stub,
    Operation(Box<OperationTask>),
}

impl ExecutionTask {
    #[must_use]
    pub fn operation(id: &str, operation: OperationTask) -> Self {
        Self {
            id: id.to_string(),
            name: operation.name.clone(),
            kind: ExecutionTaskKind::Operation(Box::new(operation)),
        }
    }

    #[must_use]
    pub fn stub(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: ExecutionTaskKind::Stub,
        }
    }

    #[must_use]
    pub fn sentinel(id: String, name: String, kind: ExecutionTaskKind) -> Self {
        debug_assert!(!matches!(
            kind,
            ExecutionTaskKind::Operation(_) | ExecutionTaskKind::Stub
        ));
        Self { id, name, kind }
    }

    /// Whether this task completes without touching the executor.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        !matches!(self.kind, ExecutionTaskKind::Operation(_))
    }

    #[must_use]
    pub fn as_operation(&self) -> Option<&OperationTask> {
        match &self.kind {
            ExecutionTaskKind::Operation(operation) => Some(operation),
            ExecutionTaskKind::StartWorkflow
            | ExecutionTaskKind::EndWorkflow
            | ExecutionTaskKind::StartSubWorkflow
            | ExecutionTaskKind::EndSubWorkflow
            | ExecutionTaskKind::Stub => None,
        }
    }
}
