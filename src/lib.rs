//! # Weaver - Workflow Orchestration Engine
//!
//! Weaver is a graph-based workflow orchestration engine for lifecycle
//! management of modeled services.
//!
//! A user-authored *workflow function* receives a fresh context and an
//! empty task graph, and describes the operations to perform on service
//! entities as a DAG. The engine translates that graph into an
//! execution plan, schedules it against a pluggable executor, records
//! per-task progress and retries in durable storage, and reports the
//! terminal execution state.
//!
//! ## Features
//!
//! - **Task graph builder**: dependencies, sequences and nested
//!   sub-workflows over operation, stub and workflow tasks
//! - **Ready-set engine**: concurrent scheduling under the graph's
//!   partial order, with retries, backoff and cooperative cancellation
//! - **Durable records**: executions and tasks persisted through a
//!   transactional key-addressable store (in-memory or redb)
//! - **Pluggable executors**: in-process thread pool or isolated
//!   subprocesses with a ctx-proxy channel back to the parent
//! - **Lifecycle signals**: workflow and task events on a synchronous,
//!   isolated observer bus
//!
//! ## Core Modules
//!
//! - [`api`] - Task types and the task graph builder
//! - [`engine`] - Graph translation and the execution engine
//! - [`executor`] - Executor contract and the built-in executors
//! - [`context`] - Workflow and operation contexts
//! - [`storage`] - Model, resource and instrumented storage
//! - [`builtin`] - Built-in lifecycle workflows
//! - [`events`] - The signal hub
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use weaver::api::task::{OperationTask, TaskOptions};
//! use weaver::executor::{FunctionRegistry, ThreadExecutor};
//! use weaver::runner::{RunnerOptions, WorkflowRunner};
//! use weaver::storage::{ModelStorage, ResourceStorage};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let model = ModelStorage::in_memory();
//! let resource = ResourceStorage::new("./resources")?;
//!
//! let registry = FunctionRegistry::new();
//! registry.register("ops.create_server", |_ctx, _inputs| Ok(()));
//!
//! let runner = WorkflowRunner::new(
//!     model.clone(),
//!     resource,
//!     "service-1",
//!     "provision",
//!     |ctx, graph| {
//!         let node = ctx.model().node.get_by_name("server")?;
//!         let create = OperationTask::for_node(
//!             &node,
//!             "Standard",
//!             "create",
//!             TaskOptions::default(),
//!         )?;
//!         graph.add_tasks(create);
//!         Ok(())
//!     },
//!     Arc::new(ThreadExecutor::new(registry, 4)),
//!     RunnerOptions::default(),
//! )?;
//!
//! runner.execute().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! Weaver can be configured via:
//! - Configuration file (`weaver.yaml`)
//! - Environment variables (prefix: `WEAVER__`)
//!
//! See [`config::WeaverConfig`] for available options.

pub mod api;
pub mod builtin;
pub mod config;
pub mod context;
pub mod ctx_proxy;
pub mod engine;
pub mod events;
pub mod executor;
pub mod inputs;
pub mod model;
pub mod runner;
pub mod storage;

pub use engine::Engine;
pub use runner::WorkflowRunner;
