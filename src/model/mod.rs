//! Service and orchestration data model.
//!
//! The service model (nodes, relationships, interfaces, operations) is
//! read-only as far as the engine is concerned; the orchestration model
//! (executions, task records) is written by the engine through the
//! storage layer, one transaction per state transition.

pub mod orchestration;
pub mod service;

pub use orchestration::{Execution, ExecutionStatus, TaskRecord, TaskStatus};
pub use service::{
    Actor, Interface, Node, Operation, Parameter, Plugin, PluginSpecification, Relationship,
    ServiceInstance,
};
