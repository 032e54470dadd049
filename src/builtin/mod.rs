//! Built-in lifecycle workflows and the workflow registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use snafu::prelude::*;

use crate::api::TaskGraph;
use crate::context::WorkflowContext;

pub mod execute_operation;
pub mod heal;
pub mod install;
pub mod uninstall;
pub mod utils;
pub mod workflows;

pub use execute_operation::execute_operation;
pub use heal::heal;
pub use install::install;
pub use uninstall::uninstall;

/// Workflow names reserved for the built-ins; policy-defined workflows
/// may not shadow them.
pub const RESERVED_WORKFLOW_NAMES: [&str; 6] = [
    "install",
    "uninstall",
    "start",
    "stop",
    "heal",
    "execute_operation",
];

/// Argument names bound by the workflow calling convention; they may
/// not appear as workflow inputs.
pub const RESERVED_ARGUMENT_NAMES: [&str; 2] = ["ctx", "graph"];

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Workflow name is reserved: {name}"))]
    ReservedName { name: String },

    #[snafu(display("Workflow not found: {name}"))]
    WorkflowNotFound { name: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A workflow function: populates the given graph by side effect.
pub type WorkflowFn =
    Arc<dyn Fn(&WorkflowContext, &mut TaskGraph) -> crate::api::Result<()> + Send + Sync>;

/// Name → workflow function registry, pre-seeded with the built-ins.
#[derive(Clone)]
pub struct WorkflowRegistry {
    workflows: Arc<RwLock<HashMap<String, WorkflowFn>>>,
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self
            .workflows
            .read()
            .map(|map| map.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        f.debug_struct("WorkflowRegistry").field("workflows", &names).finish()
    }
}

impl WorkflowRegistry {
    /// A registry with every built-in workflow registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self {
            workflows: Arc::new(RwLock::new(HashMap::new())),
        };
        registry.insert("install", Arc::new(|ctx, graph| install(ctx, graph)));
        registry.insert("uninstall", Arc::new(|ctx, graph| uninstall(ctx, graph)));
        registry.insert("start", Arc::new(|ctx, graph| workflows::start(ctx, graph)));
        registry.insert("stop", Arc::new(|ctx, graph| workflows::stop(ctx, graph)));
        registry.insert("heal", Arc::new(|ctx, graph| heal(ctx, graph)));
        registry.insert(
            "execute_operation",
            Arc::new(|ctx, graph| execute_operation(ctx, graph)),
        );
        registry
    }

    fn insert(&self, name: &str, workflow: WorkflowFn) {
        let mut workflows = self
            .workflows
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        workflows.insert(name.to_string(), workflow);
    }

    /// Register a policy-defined workflow. Reserved names are rejected.
    pub fn register(&self, name: &str, workflow: WorkflowFn) -> Result<()> {
        ensure!(
            !RESERVED_WORKFLOW_NAMES.contains(&name),
            ReservedNameSnafu { name }
        );
        self.insert(name, workflow);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<WorkflowFn> {
        let workflows = self
            .workflows
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        workflows
            .get(name)
            .cloned()
            .context(WorkflowNotFoundSnafu { name })
    }
}
