use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Persisted workflow execution state.
///
/// The wire names are stable; external tooling matches on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "TERMINATED")]
    Terminated,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl ExecutionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Terminated => "TERMINATED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted per-operation task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RETRYING")]
    Retrying,
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Retrying => "RETRYING",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record of a single workflow execution.
///
/// Status and timestamps change only through the engine transitions
/// below; a terminal status is write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub service_instance_id: String,
    pub workflow_name: String,
    #[serde(default)]
    pub parameters: IndexMap<String, serde_json::Value>,
    status: ExecutionStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl Execution {
    #[must_use]
    pub fn new(
        id: String,
        service_instance_id: String,
        workflow_name: String,
        parameters: IndexMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id,
            service_instance_id,
            workflow_name,
            parameters,
            status: ExecutionStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn mark_started(&mut self) {
        self.status = ExecutionStatus::Started;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_terminal(&mut self, status: ExecutionStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.error = error;
        self.ended_at = Some(Utc::now());
        if self.started_at.is_none() {
            self.started_at = Some(self.created_at);
        }
    }
}

/// The per-attempt record of an operation task.
///
/// Created the first time the operation becomes eligible for dispatch,
/// updated on every attempt, never deleted. Like [`Execution`], the
/// progress fields only move through the engine transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub execution_id: String,
    pub actor_id: String,
    pub name: String,
    /// Resolved implementation path, looked up by the executor.
    pub function: String,
    #[serde(default)]
    pub arguments: IndexMap<String, serde_json::Value>,
    pub plugin_name: Option<String>,
    pub max_attempts: i32,
    pub retry_interval_secs: f64,
    pub ignore_failure: bool,
    status: TaskStatus,
    attempts_count: u32,
    due_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Infinite retries.
    pub const INFINITE_RETRIES: i32 = -1;

    #[must_use]
    pub fn new(
        id: String,
        execution_id: String,
        actor_id: String,
        name: String,
        function: String,
        arguments: IndexMap<String, serde_json::Value>,
        plugin_name: Option<String>,
        max_attempts: i32,
        retry_interval_secs: f64,
        ignore_failure: bool,
    ) -> Self {
        Self {
            id,
            execution_id,
            actor_id,
            name,
            function,
            arguments,
            plugin_name,
            max_attempts,
            retry_interval_secs,
            ignore_failure,
            status: TaskStatus::Pending,
            attempts_count: 0,
            due_at: None,
            started_at: None,
            ended_at: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    #[must_use]
    pub fn attempts_count(&self) -> u32 {
        self.attempts_count
    }

    #[must_use]
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.due_at
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Whether another attempt is allowed after a failure.
    #[must_use]
    pub fn retries_left(&self) -> bool {
        self.max_attempts == Self::INFINITE_RETRIES
            || (self.attempts_count as i64) < i64::from(self.max_attempts)
    }

    pub(crate) fn mark_started(&mut self) {
        self.status = TaskStatus::Started;
        self.attempts_count += 1;
        self.due_at = None;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub(crate) fn mark_retrying(&mut self, due_at: DateTime<Utc>) {
        self.status = TaskStatus::Retrying;
        self.due_at = Some(due_at);
    }

    pub(crate) fn mark_terminal(&mut self, status: TaskStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}
