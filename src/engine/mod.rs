//! The workflow execution engine.
//!
//! The engine walks the translated execution graph with a ready-set
//! scheduler: tasks whose dependencies have all completed (and whose
//! retry backoff has elapsed) are dispatched to the executor, sentinel
//! and stub tasks complete synthetically, and every record transition
//! happens in a single storage transaction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use snafu::prelude::*;
use tokio::sync::mpsc;

use crate::api::task_graph::TaskGraph;
use crate::context::{OperationContext, WorkflowContext};
use crate::events::Event;
use crate::executor::{Executor, TaskHandle, TaskNotification};
use crate::model::{ExecutionStatus, TaskRecord, TaskStatus};

pub mod tasks;
pub mod translation;

pub use tasks::{ExecutionTask, ExecutionTaskKind};
pub use translation::{ExecutionGraph, build_execution_graph};

#[derive(Debug, Snafu)]
pub enum Error {
    /// Terminal wrapper for the underlying operation failure.
    #[snafu(display("Task failed: {error}"))]
    ExecutorException { error: String, traceback: String },

    #[snafu(display("Translation error: {message}"))]
    Translation { message: String },

    #[snafu(display("Task graph error: {source}"))]
    Api { source: crate::api::Error },

    #[snafu(display("Storage error: {source}"))]
    Storage { source: crate::storage::Error },

    #[snafu(display("Context error: {source}"))]
    Context { source: crate::context::Error },

    #[snafu(display("Executor error: {source}"))]
    Executor { source: crate::executor::Error },

    #[snafu(display("Engine error: {message}"))]
    Engine { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<crate::api::Error> for Error {
    fn from(source: crate::api::Error) -> Self {
        Error::Api { source }
    }
}

impl From<crate::storage::Error> for Error {
    fn from(source: crate::storage::Error) -> Self {
        Error::Storage { source }
    }
}

impl From<crate::context::Error> for Error {
    fn from(source: crate::context::Error) -> Self {
        Error::Context { source }
    }
}

impl From<crate::executor::Error> for Error {
    fn from(source: crate::executor::Error) -> Self {
        Error::Executor { source }
    }
}

enum Outcome {
    Completed,
    Cancelled,
    Failed { error: String, traceback: String },
}

/// Transient scheduling state; the durable counterpart lives in the
/// task records.
struct ScheduleState {
    pending: HashSet<String>,
    running: HashSet<String>,
    completed: HashSet<String>,
    due: HashMap<String, DateTime<Utc>>,
    failure: Option<(String, String)>,
}

impl ScheduleState {
    fn next_due(&self) -> Option<DateTime<Utc>> {
        self.pending
            .iter()
            .filter_map(|id| self.due.get(id))
            .min()
            .copied()
    }
}

/// Drives one execution of a translated task graph to a terminal state.
pub struct Engine {
    executor: Arc<dyn Executor>,
    ctx: WorkflowContext,
    graph: ExecutionGraph,
}

impl Engine {
    /// Translate the API graph and wrap it with the context and
    /// executor that will drive it.
    pub fn new(
        executor: Arc<dyn Executor>,
        ctx: WorkflowContext,
        tasks_graph: &TaskGraph,
    ) -> Result<Self> {
        let graph = build_execution_graph(tasks_graph)?;
        Ok(Self {
            executor,
            ctx,
            graph,
        })
    }

    /// The sentinel-bearing execution graph driven by this engine.
    #[must_use]
    pub fn execution_graph(&self) -> &ExecutionGraph {
        &self.graph
    }

    #[must_use]
    pub fn workflow_context(&self) -> &WorkflowContext {
        &self.ctx
    }

    /// Request cooperative cancellation. The engine stops dispatching,
    /// running operations observe the shared flag through their
    /// contexts, and the execution ends CANCELLED once they drain. A
    /// cancel before the engine started transitions the execution
    /// directly; a cancel after a terminal state is a no-op.
    pub fn cancel_execution(&self) {
        self.ctx.cancel();
        if let Ok(execution) = self.ctx.execution() {
            if execution.status() == ExecutionStatus::Pending {
                let _ = self
                    .ctx
                    .mark_execution_terminal(ExecutionStatus::Cancelled, None);
            }
        }
    }

    /// Run until the execution reaches a terminal state.
    ///
    /// Returns `Ok` for TERMINATED and CANCELLED; a task failure that
    /// exhausts its retry policy surfaces as
    /// [`Error::ExecutorException`] after the execution is marked
    /// FAILED.
    pub async fn execute(&self) -> Result<()> {
        if self.ctx.execution()?.status().is_terminal() {
            return Ok(());
        }

        self.ctx.mark_execution_started()?;
        self.ctx.hub().emit(&Event::WorkflowStarted {
            execution_id: self.ctx.id().to_string(),
        });

        let (tx, mut rx) = mpsc::unbounded_channel::<TaskNotification>();
        let mut state = ScheduleState {
            pending: self.graph.task_ids().map(str::to_string).collect(),
            running: HashSet::new(),
            completed: HashSet::new(),
            due: HashMap::new(),
            failure: None,
        };
        let cancel_notify = self.ctx.cancel_notify();
        let total = self.graph.len();

        let outcome = loop {
            if self.ctx.is_cancelled() {
                break Outcome::Cancelled;
            }
            if let Some((error, traceback)) = state.failure.take() {
                break Outcome::Failed { error, traceback };
            }

            if self.step(&mut state, &tx).await? {
                continue;
            }
            if state.completed.len() == total {
                break Outcome::Completed;
            }

            let next_due = state.next_due();
            let sleep = next_due
                .map(|due| (due - Utc::now()).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(Duration::from_secs(3600));
            if state.running.is_empty() && next_due.is_none() {
                // Nothing runs, nothing is deferred, nothing became
                // eligible: the graph cannot make progress.
                return Err(Error::Engine {
                    message: "execution stalled with unmet dependencies".to_string(),
                });
            }

            tokio::select! {
                notification = rx.recv() => {
                    if let Some(notification) = notification {
                        self.on_notification(&mut state, notification, false)?;
                    }
                }
                _ = cancel_notify.notified() => {}
                _ = tokio::time::sleep(sleep), if next_due.is_some() => {}
            }
        };

        // Let in-flight operations reach their terminal notification;
        // nothing new is dispatched past this point.
        while !state.running.is_empty() {
            match rx.recv().await {
                Some(notification) => self.on_notification(&mut state, notification, true)?,
                None => break,
            }
        }

        match outcome {
            Outcome::Completed => {
                self.ctx
                    .mark_execution_terminal(ExecutionStatus::Terminated, None)?;
                self.ctx.hub().emit(&Event::WorkflowSucceeded {
                    execution_id: self.ctx.id().to_string(),
                });
                Ok(())
            }
            Outcome::Cancelled => {
                self.ctx
                    .mark_execution_terminal(ExecutionStatus::Cancelled, None)?;
                self.ctx.hub().emit(&Event::WorkflowCancelled {
                    execution_id: self.ctx.id().to_string(),
                });
                Ok(())
            }
            Outcome::Failed { error, traceback } => {
                self.ctx
                    .mark_execution_terminal(ExecutionStatus::Failed, Some(error.clone()))?;
                self.ctx.hub().emit(&Event::WorkflowFailed {
                    execution_id: self.ctx.id().to_string(),
                    error: error.clone(),
                });
                Err(Error::ExecutorException { error, traceback })
            }
        }
    }

    /// Complete synthetic tasks and dispatch eligible operations.
    /// Returns whether anything progressed.
    async fn step(
        &self,
        state: &mut ScheduleState,
        tx: &mpsc::UnboundedSender<TaskNotification>,
    ) -> Result<bool> {
        let now = Utc::now();
        let eligible: Vec<String> = state
            .pending
            .iter()
            .filter(|id| {
                self.graph
                    .dependencies(id)
                    .iter()
                    .all(|dependency| state.completed.contains(*dependency))
                    && state.due.get(*id).is_none_or(|due| now >= *due)
            })
            .cloned()
            .collect();

        let mut progressed = false;
        for id in eligible {
            let task = self.graph.get(&id).ok_or_else(|| Error::Engine {
                message: format!("unknown execution task {id}"),
            })?;
            state.pending.remove(&id);
            if task.is_synthetic() {
                state.completed.insert(id);
                progressed = true;
            } else {
                self.dispatch_operation(task, tx).await?;
                state.running.insert(id);
                progressed = true;
            }
        }
        Ok(progressed)
    }

    async fn dispatch_operation(
        &self,
        task: &ExecutionTask,
        tx: &mpsc::UnboundedSender<TaskNotification>,
    ) -> Result<()> {
        let operation = task.as_operation().ok_or_else(|| Error::Engine {
            message: format!("task {} is not an operation", task.id),
        })?;
        let model = self.ctx.model();

        // The record is created on first eligibility and carried across
        // attempts afterwards.
        if model.task.try_get(&task.id)?.is_none() {
            let record = TaskRecord::new(
                task.id.clone(),
                self.ctx.id().to_string(),
                operation.actor.id().to_string(),
                operation.name.clone(),
                operation.implementation.clone(),
                operation.arguments(),
                operation.plugin.as_ref().map(|plugin| plugin.name.clone()),
                operation.max_attempts,
                operation.retry_interval.as_secs_f64(),
                operation.ignore_failure,
            );
            model.task.put(&record)?;
        }

        model.task.update_with(&task.id, |record| {
            record.mark_started();
            Ok(())
        })?;

        let operation_ctx = OperationContext::new(
            &operation.name,
            &task.id,
            operation.actor.clone(),
            self.ctx.id(),
            self.ctx.service_instance_id(),
            model.clone(),
            self.ctx.resource().clone(),
            self.ctx.workdir().to_path_buf(),
            self.ctx.cancel_flag(),
        );
        self.executor
            .submit(TaskHandle::new(operation_ctx, tx.clone()))
            .await?;

        self.ctx.hub().emit(&Event::TaskSent {
            execution_id: self.ctx.id().to_string(),
            task_id: task.id.clone(),
            name: task.name.clone(),
        });
        tracing::debug!(task = %task.name, task_id = %task.id, "task sent");
        Ok(())
    }

    fn on_notification(
        &self,
        state: &mut ScheduleState,
        notification: TaskNotification,
        draining: bool,
    ) -> Result<()> {
        let execution_id = self.ctx.id().to_string();
        match notification {
            TaskNotification::Started { task_id } => {
                let name = self.task_name(&task_id);
                self.ctx.hub().emit(&Event::TaskStarted {
                    execution_id,
                    task_id,
                    name,
                });
            }
            TaskNotification::Succeeded { task_id } => {
                self.ctx.model().task.update_with(&task_id, |record| {
                    record.mark_terminal(TaskStatus::Success);
                    Ok(())
                })?;
                state.running.remove(&task_id);
                state.completed.insert(task_id.clone());
                let name = self.task_name(&task_id);
                self.ctx.hub().emit(&Event::TaskSucceeded {
                    execution_id,
                    task_id,
                    name,
                });
            }
            TaskNotification::Failed {
                task_id,
                error,
                traceback,
            } => {
                state.running.remove(&task_id);
                let record = self.ctx.model().task.get(&task_id)?;
                let name = self.task_name(&task_id);

                if record.ignore_failure {
                    // Failed attempt treated as success immediately; no
                    // retries, no workflow failure.
                    self.ctx.model().task.update_with(&task_id, |record| {
                        record.mark_terminal(TaskStatus::Failed);
                        Ok(())
                    })?;
                    state.completed.insert(task_id.clone());
                    self.ctx.hub().emit(&Event::TaskFailed {
                        execution_id,
                        task_id,
                        name,
                        error,
                    });
                } else if record.retries_left() {
                    let due = Utc::now()
                        + chrono::Duration::milliseconds(
                            (record.retry_interval_secs * 1000.0) as i64,
                        );
                    self.ctx.model().task.update_with(&task_id, |record| {
                        record.mark_retrying(due);
                        Ok(())
                    })?;
                    if !draining {
                        state.due.insert(task_id.clone(), due);
                        state.pending.insert(task_id.clone());
                    }
                    self.ctx.hub().emit(&Event::TaskFailed {
                        execution_id,
                        task_id,
                        name,
                        error,
                    });
                } else {
                    self.ctx.model().task.update_with(&task_id, |record| {
                        record.mark_terminal(TaskStatus::Failed);
                        Ok(())
                    })?;
                    state.completed.insert(task_id.clone());
                    self.ctx.hub().emit(&Event::TaskFailed {
                        execution_id,
                        task_id,
                        name,
                        error: error.clone(),
                    });
                    if state.failure.is_none() {
                        state.failure = Some((error, traceback));
                    }
                }
            }
        }
        Ok(())
    }

    fn task_name(&self, task_id: &str) -> String {
        self.graph
            .get(task_id)
            .map(|task| task.name.clone())
            .unwrap_or_else(|| task_id.to_string())
    }
}
