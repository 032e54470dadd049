//! The user-facing task graph API.
//!
//! Workflow functions receive an empty [`TaskGraph`] and populate it
//! with tasks built by the constructors in [`task`]; the engine
//! translates the result into an execution graph.

use snafu::prelude::*;

pub mod task;
pub mod task_graph;

pub use task::{OperationTask, RunsOn, Task, TaskKind, TaskOptions};
pub use task_graph::TaskGraph;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "Could not find operation \"{operation}\" on interface \"{interface}\" for {actor_kind} \"{actor}\""
    ))]
    OperationNotFound {
        operation: String,
        interface: String,
        actor_kind: String,
        actor: String,
    },

    #[snafu(display(
        "Could not find plugin of operation \"{operation}\" on interface \"{interface}\" for {actor_kind} \"{actor}\""
    ))]
    PluginNotFound {
        operation: String,
        interface: String,
        actor_kind: String,
        actor: String,
    },

    #[snafu(display("Task is not in the graph: {task_id}"))]
    TaskNotInGraph { task_id: String },

    #[snafu(display("Task cannot depend on itself: {task_id}"))]
    SelfDependency { task_id: String },

    #[snafu(display("Dependency from {dependent} on {dependency} would create a cycle"))]
    DependencyCycle { dependent: String, dependency: String },

    #[snafu(display("Context error: {source}"))]
    Context { source: crate::context::Error },

    #[snafu(display("Storage error: {source}"))]
    Storage { source: crate::storage::Error },

    #[snafu(display("Workflow error: {message}"))]
    Workflow { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<crate::context::Error> for Error {
    fn from(source: crate::context::Error) -> Self {
        Error::Context { source }
    }
}

impl From<crate::storage::Error> for Error {
    fn from(source: crate::storage::Error) -> Self {
        Error::Storage { source }
    }
}
