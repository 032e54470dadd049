//! Construction glue: from a workflow function to a running engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use snafu::prelude::*;

use crate::api::task_graph::TaskGraph;
use crate::builtin::RESERVED_ARGUMENT_NAMES;
use crate::context::workflow::{WorkflowContextOptions, current};
use crate::context::WorkflowContext;
use crate::engine::Engine;
use crate::events::SignalHub;
use crate::executor::Executor;
use crate::model::Execution;
use crate::storage::{ModelStorage, ResourceStorage};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Workflow input name is reserved: {name}"))]
    ReservedArgument { name: String },

    #[snafu(display("Workflow function failed: {source}"))]
    WorkflowFunction { source: crate::api::Error },

    #[snafu(display("Context error: {source}"))]
    Context { source: crate::context::Error },

    #[snafu(display("Engine error: {source}"))]
    Engine { source: crate::engine::Error },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<crate::context::Error> for Error {
    fn from(source: crate::context::Error) -> Self {
        Error::Context { source }
    }
}

impl From<crate::engine::Error> for Error {
    fn from(source: crate::engine::Error) -> Self {
        Error::Engine { source }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub parameters: IndexMap<String, Value>,
    pub workdir: Option<PathBuf>,
    pub task_max_attempts: i32,
    pub task_retry_interval: Duration,
    pub task_ignore_failure: bool,
    pub hub: SignalHub,
}

impl Default for RunnerOptions {
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

/// Creates the execution, runs the workflow function against a fresh
/// graph inside a current-context scope, and wraps the result in an
/// engine ready to execute.
pub struct WorkflowRunner {
    engine: Arc<Engine>,
}

impl WorkflowRunner {
    pub fn new(
        model: ModelStorage,
        resource: ResourceStorage,
        service_instance_id: &str,
        workflow_name: &str,
        workflow_fn: impl FnOnce(&WorkflowContext, &mut TaskGraph) -> crate::api::Result<()>,
        executor: Arc<dyn Executor>,
        options: RunnerOptions,
    ) -> Result<Self> {
        for name in options.parameters.keys() {
            ensure!(
                !RESERVED_ARGUMENT_NAMES.contains(&name.as_str()),
                ReservedArgumentSnafu { name: name.clone() }
            );
        }

        let ctx = WorkflowContext::create(
            model,
            resource,
            service_instance_id,
            workflow_name,
            WorkflowContextOptions {
                parameters: options.parameters,
                workdir: options.workdir,
                task_max_attempts: options.task_max_attempts,
                task_retry_interval: options.task_retry_interval,
                task_ignore_failure: options.task_ignore_failure,
                hub: options.hub,
            },
        )?;

        let mut graph = TaskGraph::new(workflow_name);
        {
            let _scope = current::push(&ctx);
            // A failing workflow function aborts here; the partial
            // graph is simply dropped.
            workflow_fn(&ctx, &mut graph).context(WorkflowFunctionSnafu)?;
        }

        let engine = Engine::new(executor, ctx, &graph)?;
        Ok(Self {
            engine: Arc::new(engine),
        })
    }

    #[must_use]
    pub fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine)
    }

    #[must_use]
    pub fn workflow_context(&self) -> &WorkflowContext {
        self.engine.workflow_context()
    }

    pub fn execution(&self) -> Result<Execution> {
        Ok(self.engine.workflow_context().execution()?)
    }

    /// Run to a terminal state.
    pub async fn execute(&self) -> crate::engine::Result<()> {
        self.engine.execute().await
    }

    pub fn cancel(&self) {
        self.engine.cancel_execution();
    }
}
