//! Per-execution state carriers.
//!
//! A [`WorkflowContext`] exists from workflow-function entry until the
//! execution terminates; an [`OperationContext`] is constructed per
//! operation attempt. Task constructors discover the active workflow
//! context through the scoped stack in [`workflow::current`].

use snafu::prelude::*;

pub mod operation;
pub mod workflow;

pub use operation::{OperationContext, SerializedOperationContext};
pub use workflow::WorkflowContext;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("No context was set"))]
    ContextMissing,

    #[snafu(display("Storage error: {source}"))]
    Storage { source: crate::storage::Error },

    #[snafu(display("Context error: {message}"))]
    Context { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<crate::storage::Error> for Error {
    fn from(source: crate::storage::Error) -> Self {
        Error::Storage { source }
    }
}
