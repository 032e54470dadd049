//! Task executors.
//!
//! An executor accepts ready tasks from the engine and eventually
//! reports exactly one terminal notification per task, preceded by a
//! started notification. The thread-pool variant runs operations
//! in-process from the function registry; the subprocess variant runs
//! them as child processes with a ctx-proxy channel back to the parent.

use async_trait::async_trait;
use snafu::prelude::*;
use tokio::sync::mpsc;

use crate::context::OperationContext;

pub mod registry;
pub mod subprocess;
pub mod thread;

pub use registry::{FunctionRegistry, OperationResult};
pub use subprocess::SubprocessExecutor;
pub use thread::ThreadExecutor;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Execution error: {message}"))]
    Execution { message: String },

    #[snafu(display("Executor is closed"))]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;

/// What an executor reports back about a submitted task.
#[derive(Debug, Clone)]
pub enum TaskNotification {
    Started {
        task_id: String,
    },
    Succeeded {
        task_id: String,
    },
    Failed {
        task_id: String,
        error: String,
        traceback: String,
    },
}

impl TaskNotification {
    #[must_use]
    pub fn task_id(&self) -> &str {
        match self {
            Self::Started { task_id }
            | Self::Succeeded { task_id }
            | Self::Failed { task_id, .. } => task_id,
        }
    }
}

/// A dispatched task: the operation context plus the channel the
/// executor reports through.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    ctx: OperationContext,
    notifier: mpsc::UnboundedSender<TaskNotification>,
}

impl TaskHandle {
    #[must_use]
    pub fn new(ctx: OperationContext, notifier: mpsc::UnboundedSender<TaskNotification>) -> Self {
        Self { ctx, notifier }
    }

    #[must_use]
    pub fn ctx(&self) -> &OperationContext {
        &self.ctx
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        self.ctx.task_id()
    }

    pub fn started(&self) {
        self.notify(TaskNotification::Started {
            task_id: self.task_id().to_string(),
        });
    }

    pub fn succeeded(&self) {
        self.notify(TaskNotification::Succeeded {
            task_id: self.task_id().to_string(),
        });
    }

    pub fn failed(&self, error: String, traceback: String) {
        self.notify(TaskNotification::Failed {
            task_id: self.task_id().to_string(),
            error,
            traceback,
        });
    }

    fn notify(&self, notification: TaskNotification) {
        // The receiver only goes away when the engine has already
        // reached a terminal state; late notifications are dropped.
        let _ = self.notifier.send(notification);
    }
}

/// The executor contract consumed by the engine.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Enqueue a task for execution. May apply brief backpressure but
    /// must not block arbitrarily.
    async fn submit(&self, task: TaskHandle) -> Result<()>;

    /// Drain and stop workers. Safe to call repeatedly.
    async fn close(&self);
}
