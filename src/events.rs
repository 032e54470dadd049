//! Workflow and task lifecycle signals.
//!
//! A small synchronous publish/subscribe registry keyed by signal kind.
//! Delivery is in-line with the emitting engine step; a panicking
//! subscriber is isolated and logged, never propagated.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    StartWorkflow,
    OnSuccessWorkflow,
    OnFailureWorkflow,
    OnCancelledWorkflow,
    SentTask,
    OnStartTask,
    OnSuccessTask,
    OnFailureTask,
}

impl Signal {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::StartWorkflow => "start_workflow",
            Self::OnSuccessWorkflow => "on_success_workflow",
            Self::OnFailureWorkflow => "on_failure_workflow",
            Self::OnCancelledWorkflow => "on_cancelled_workflow",
            Self::SentTask => "sent_task",
            Self::OnStartTask => "on_start_task",
            Self::OnSuccessTask => "on_success_task",
            Self::OnFailureTask => "on_failure_task",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    WorkflowStarted {
        execution_id: String,
    },
    WorkflowSucceeded {
        execution_id: String,
    },
    WorkflowFailed {
        execution_id: String,
        error: String,
    },
    WorkflowCancelled {
        execution_id: String,
    },
    TaskSent {
        execution_id: String,
        task_id: String,
        name: String,
    },
    TaskStarted {
        execution_id: String,
        task_id: String,
        name: String,
    },
    TaskSucceeded {
        execution_id: String,
        task_id: String,
        name: String,
    },
    TaskFailed {
        execution_id: String,
        task_id: String,
        name: String,
        error: String,
    },
}

impl Event {
    #[must_use]
    pub fn signal(&self) -> Signal {
        match self {
            Self::WorkflowStarted { .. } => Signal::StartWorkflow,
            Self::WorkflowSucceeded { .. } => Signal::OnSuccessWorkflow,
            Self::WorkflowFailed { .. } => Signal::OnFailureWorkflow,
            Self::WorkflowCancelled { .. } => Signal::OnCancelledWorkflow,
            Self::TaskSent { .. } => Signal::SentTask,
            Self::TaskStarted { .. } => Signal::OnStartTask,
            Self::TaskSucceeded { .. } => Signal::OnSuccessTask,
            Self::TaskFailed { .. } => Signal::OnFailureTask,
        }
    }
}

type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

/// Cloneable handle to one subscription registry.
#[derive(Clone, Default)]
pub struct SignalHub {
    subscribers: Arc<RwLock<HashMap<Signal, Vec<Subscriber>>>>,
}

impl std::fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count: usize = self
            .subscribers
            .read()
            .map(|map| map.values().map(Vec::len).sum())
            .unwrap_or(0);
        f.debug_struct("SignalHub").field("subscribers", &count).finish()
    }
}

impl SignalHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, signal: Signal, subscriber: impl Fn(&Event) + Send + Sync + 'static) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        subscribers.entry(signal).or_default().push(Arc::new(subscriber));
    }

    /// Subscribe to every signal.
    pub fn subscribe_all(&self, subscriber: impl Fn(&Event) + Send + Sync + 'static) {
        let subscriber: Subscriber = Arc::new(subscriber);
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for signal in [
            Signal::StartWorkflow,
            Signal::OnSuccessWorkflow,
            Signal::OnFailureWorkflow,
            Signal::OnCancelledWorkflow,
            Signal::SentTask,
            Signal::OnStartTask,
            Signal::OnSuccessTask,
            Signal::OnFailureTask,
        ] {
            subscribers
                .entry(signal)
                .or_default()
                .push(Arc::clone(&subscriber));
        }
    }

    pub fn emit(&self, event: &Event) {
        let subscribers = {
            let map = self
                .subscribers
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            map.get(&event.signal()).cloned().unwrap_or_default()
        };
        for subscriber in subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
                tracing::warn!(signal = event.signal().name(), "signal subscriber panicked");
            }
        }
    }
}
