use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde_json::Value;

use crate::context::OperationContext;

pub type OperationResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// An operation implementation: invoked with the operation context and
/// the task's bound arguments.
pub type OperationFn =
    dyn Fn(&OperationContext, &IndexMap<String, Value>) -> OperationResult + Send + Sync;

/// Maps resolved implementation paths to operation functions.
///
/// This is the in-process analogue of importing a callable by its
/// dotted path: the thread executor looks implementations up here by
/// the path recorded on the task.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: Arc<RwLock<HashMap<String, Arc<OperationFn>>>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.functions.read().map(|map| map.len()).unwrap_or(0);
        f.debug_struct("FunctionRegistry")
            .field("functions", &count)
            .finish()
    }
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        path: &str,
        function: impl Fn(&OperationContext, &IndexMap<String, Value>) -> OperationResult
        + Send
        + Sync
        + 'static,
    ) {
        let mut functions = self
            .functions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        functions.insert(path.to_string(), Arc::new(function));
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<Arc<OperationFn>> {
        let functions = self
            .functions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        functions.get(path).cloned()
    }
}
