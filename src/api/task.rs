//! Tasks to be entered into the task graph.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::WorkflowContext;
use crate::context::workflow::current;
use crate::model::{Actor, Node, Operation, Parameter, Plugin, Relationship};

use super::task_graph::TaskGraph;
use super::{Error, Result};

/// Where a relationship operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunsOn {
    Node,
    Source,
    Target,
}

/// Overrides for an operation task; unset fields fall back to the
/// workflow context defaults.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub max_attempts: Option<i32>,
    pub retry_interval: Option<Duration>,
    pub ignore_failure: Option<bool>,
    pub inputs: Option<IndexMap<String, Value>>,
}

/// A task in the user-level graph. The closed set of variants is the
/// whole hierarchy; there is nothing to subclass.
#[derive(Debug, Clone)]
pub struct Task {
    id: String,
    kind: TaskKind,
}

#[derive(Debug, Clone)]
pub enum TaskKind {
    /// An invokable unit bound to an actor operation.
    Operation(Box<OperationTask>),
    /// A no-op placeholder.
    Stub,
    /// An embedded sub-workflow with its own graph.
    Workflow(Box<TaskGraph>),
}

impl Task {
    fn with_kind(kind: TaskKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
        }
    }

    /// An empty placeholder task.
    #[must_use]
    pub fn stub() -> Self {
        Self::with_kind(TaskKind::Stub)
    }

    /// Build a sub-workflow task by running `build` against a fresh
    /// graph. The workflow context is taken from the current scope.
    pub fn workflow(
        name: &str,
        build: impl FnOnce(&WorkflowContext, &mut TaskGraph) -> Result<()>,
    ) -> Result<Self> {
        let ctx = current::get()?;
        Self::workflow_with_context(&ctx, name, build)
    }

    /// Like [`workflow`](Self::workflow) with an explicit context.
    pub fn workflow_with_context(
        ctx: &WorkflowContext,
        name: &str,
        build: impl FnOnce(&WorkflowContext, &mut TaskGraph) -> Result<()>,
    ) -> Result<Self> {
        let mut graph = TaskGraph::new(name);
        build(ctx, &mut graph)?;
        Ok(Self::with_kind(TaskKind::Workflow(Box::new(graph))))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    #[must_use]
    pub fn name(&self) -> String {
        match &self.kind {
            TaskKind::Operation(operation) => operation.name.clone(),
            TaskKind::Stub => format!("stub-{}", self.id),
            TaskKind::Workflow(graph) => graph.name().to_string(),
        }
    }

    #[must_use]
    pub fn as_operation(&self) -> Option<&OperationTask> {
        match &self.kind {
            TaskKind::Operation(operation) => Some(operation),
            TaskKind::Stub | TaskKind::Workflow(_) => None,
        }
    }

    #[must_use]
    pub fn as_workflow(&self) -> Option<&TaskGraph> {
        match &self.kind {
            TaskKind::Workflow(graph) => Some(graph),
            TaskKind::Operation(_) | TaskKind::Stub => None,
        }
    }
}

/// An operation task: a resolved binding of an actor's interface
/// operation, its merged inputs, and its retry policy.
#[derive(Debug, Clone)]
pub struct OperationTask {
    pub actor: Actor,
    pub actor_name: String,
    pub name: String,
    pub interface_name: String,
    pub operation_name: String,
    pub implementation: String,
    pub plugin: Option<Plugin>,
    pub runs_on: RunsOn,
    pub inputs: IndexMap<String, Parameter>,
    pub max_attempts: i32,
    pub retry_interval: Duration,
    pub ignore_failure: bool,
}

impl OperationTask {
    /// Create an operation task on a node. Defaults not overridden in
    /// `options` are taken from the current workflow context.
    pub fn for_node(
        node: &Node,
        interface_name: &str,
        operation_name: &str,
        options: TaskOptions,
    ) -> Result<Task> {
        let operation = node
            .interface_operation(interface_name, operation_name)
            .cloned();
        Self::build(
            Actor::Node {
                id: node.id.clone(),
            },
            &node.name,
            "node",
            interface_name,
            operation_name,
            RunsOn::Node,
            operation,
            options,
        )
    }

    /// Create an operation task on a relationship edge.
    pub fn for_relationship(
        relationship: &Relationship,
        interface_name: &str,
        operation_name: &str,
        runs_on: RunsOn,
        options: TaskOptions,
    ) -> Result<Task> {
        let operation = relationship
            .interface_operation(interface_name, operation_name)
            .cloned();
        Self::build(
            Actor::Relationship {
                id: relationship.id.clone(),
            },
            &relationship.name,
            "relationship",
            interface_name,
            operation_name,
            runs_on,
            operation,
            options,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        actor: Actor,
        actor_name: &str,
        actor_kind: &str,
        interface_name: &str,
        operation_name: &str,
        runs_on: RunsOn,
        operation: Option<Operation>,
        options: TaskOptions,
    ) -> Result<Task> {
        let ctx = current::get()?;

        let not_found = || Error::OperationNotFound {
            operation: operation_name.to_string(),
            interface: interface_name.to_string(),
            actor_kind: actor_kind.to_string(),
            actor: actor_name.to_string(),
        };
        let operation = operation.ok_or_else(|| not_found())?;
        let implementation = operation.implementation.clone().ok_or_else(|| not_found())?;

        let plugin = match &operation.plugin {
            Some(specification) => {
                let installed = ctx.model().plugin.list()?;
                Some(specification.find_plugin(&installed).ok_or_else(|| {
                    Error::PluginNotFound {
                        operation: operation_name.to_string(),
                        interface: interface_name.to_string(),
                        actor_kind: actor_kind.to_string(),
                        actor: actor_name.to_string(),
                    }
                })?)
            }
            None => None,
        };

        // Operation-declared inputs first, overrides win.
        let mut inputs = operation.inputs.clone();
        if let Some(overrides) = options.inputs {
            for (key, value) in overrides {
                let parameter = Parameter::wrap(&key, value);
                inputs.insert(key, parameter);
            }
        }

        let name = format!("{interface_name}:{operation_name}@{actor_kind}:{actor_name}");

        Ok(Task::with_kind(TaskKind::Operation(Box::new(Self {
            actor,
            actor_name: actor_name.to_string(),
            name,
            interface_name: interface_name.to_string(),
            operation_name: operation_name.to_string(),
            implementation,
            plugin,
            runs_on,
            inputs,
            max_attempts: options.max_attempts.unwrap_or_else(|| ctx.task_max_attempts()),
            retry_interval: options
                .retry_interval
                .unwrap_or_else(|| ctx.task_retry_interval()),
            ignore_failure: options
                .ignore_failure
                .unwrap_or_else(|| ctx.task_ignore_failure()),
        }))))
    }

    /// Input values with the parameter envelope stripped.
    #[must_use]
    pub fn arguments(&self) -> IndexMap<String, Value> {
        self.inputs
            .iter()
            .map(|(key, parameter)| (key.clone(), parameter.value.clone()))
            .collect()
    }
}
