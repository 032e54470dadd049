//! Shared fixtures: a small modeled service (two nodes joined by one
//! relationship), a function registry, and signal recorders.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use weaver::events::{Event, SignalHub};
use weaver::model::{Interface, Node, Operation, Relationship, ServiceInstance};
use weaver::storage::{ModelStorage, ResourceStorage};

pub const SERVICE_INSTANCE_ID: &str = "service-1";
pub const DEPENDENCY_NODE_ID: &str = "node-dependency";
pub const DEPENDENCY_NODE_NAME: &str = "dependency_node";
pub const DEPENDENT_NODE_ID: &str = "node-dependent";
pub const DEPENDENT_NODE_NAME: &str = "dependent_node";
pub const RELATIONSHIP_ID: &str = "relationship-1";

pub struct TestEnvironment {
    pub model: ModelStorage,
    pub resource: ResourceStorage,
    pub hub: SignalHub,
    pub states: Arc<Mutex<Vec<&'static str>>>,
    pub sent_tasks: Arc<Mutex<usize>>,
    _tempdir: tempfile::TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let model = ModelStorage::in_memory();
        let resource = ResourceStorage::new(tempdir.path().join("resources")).expect("resources");

        seed_service(&model);

        let hub = SignalHub::new();
        let states: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let sent_tasks = Arc::new(Mutex::new(0usize));

        let state_sink = Arc::clone(&states);
        let sent_sink = Arc::clone(&sent_tasks);
        hub.subscribe_all(move |event| match event {
            Event::WorkflowStarted { .. } => state_sink.lock().unwrap().push("start"),
            Event::WorkflowSucceeded { .. } => state_sink.lock().unwrap().push("success"),
            Event::WorkflowFailed { .. } => state_sink.lock().unwrap().push("failure"),
            Event::WorkflowCancelled { .. } => state_sink.lock().unwrap().push("cancel"),
            Event::TaskSent { .. } => *sent_sink.lock().unwrap() += 1,
            Event::TaskStarted { .. }
            | Event::TaskSucceeded { .. }
            | Event::TaskFailed { .. } => {}
        });

        Self {
            model,
            resource,
            hub,
            states,
            sent_tasks,
            _tempdir: tempdir,
        }
    }

    pub fn states(&self) -> Vec<&'static str> {
        self.states.lock().unwrap().clone()
    }

    pub fn sent_task_count(&self) -> usize {
        *self.sent_tasks.lock().unwrap()
    }

    pub fn dependency_node(&self) -> Node {
        self.model.node.get(DEPENDENCY_NODE_ID).expect("dependency node")
    }

    pub fn dependent_node(&self) -> Node {
        self.model.node.get(DEPENDENT_NODE_ID).expect("dependent node")
    }

    /// Declare an operation with the given implementation path on a
    /// node's interface.
    pub fn set_node_operation(
        &self,
        node_id: &str,
        interface_name: &str,
        operation_name: &str,
        implementation: &str,
    ) {
        let interface_name = interface_name.to_string();
        let operation_name = operation_name.to_string();
        let implementation = implementation.to_string();
        self.model
            .node
            .update_with(node_id, move |node| {
                let interface = node
                    .interfaces
                    .entry(interface_name.clone())
                    .or_insert_with(|| Interface {
                        name: interface_name.clone(),
                        operations: IndexMap::new(),
                    });
                interface.operations.insert(
                    operation_name.clone(),
                    Operation {
                        name: operation_name.clone(),
                        implementation: Some(implementation.clone()),
                        plugin: None,
                        inputs: IndexMap::new(),
                    },
                );
                Ok(())
            })
            .expect("set node operation");
    }

    /// Declare an operation on the relationship's interface.
    pub fn set_relationship_operation(
        &self,
        interface_name: &str,
        operation_name: &str,
        implementation: &str,
    ) {
        let interface_name = interface_name.to_string();
        let operation_name = operation_name.to_string();
        let implementation = implementation.to_string();
        self.model
            .relationship
            .update_with(RELATIONSHIP_ID, move |relationship| {
                let interface = relationship
                    .interfaces
                    .entry(interface_name.clone())
                    .or_insert_with(|| Interface {
                        name: interface_name.clone(),
                        operations: IndexMap::new(),
                    });
                interface.operations.insert(
                    operation_name.clone(),
                    Operation {
                        name: operation_name.clone(),
                        implementation: Some(implementation.clone()),
                        plugin: None,
                        inputs: IndexMap::new(),
                    },
                );
                Ok(())
            })
            .expect("set relationship operation");
    }
}

fn seed_service(model: &ModelStorage) {
    model
        .service_instance
        .put(&ServiceInstance {
            id: SERVICE_INSTANCE_ID.to_string(),
            name: "test_service".to_string(),
            service_template_id: "template-1".to_string(),
        })
        .expect("service instance");

    model
        .node
        .put(&Node {
            id: DEPENDENCY_NODE_ID.to_string(),
            name: DEPENDENCY_NODE_NAME.to_string(),
            service_instance_id: SERVICE_INSTANCE_ID.to_string(),
            host_id: Some(DEPENDENCY_NODE_ID.to_string()),
            interfaces: IndexMap::new(),
            attributes: IndexMap::new(),
            outbound_relationship_ids: Vec::new(),
            type_hierarchy: vec!["Root".to_string(), "Compute".to_string()],
        })
        .expect("dependency node");

    model
        .node
        .put(&Node {
            id: DEPENDENT_NODE_ID.to_string(),
            name: DEPENDENT_NODE_NAME.to_string(),
            service_instance_id: SERVICE_INSTANCE_ID.to_string(),
            host_id: Some(DEPENDENT_NODE_ID.to_string()),
            interfaces: IndexMap::new(),
            attributes: IndexMap::new(),
            outbound_relationship_ids: vec![RELATIONSHIP_ID.to_string()],
            type_hierarchy: vec!["Root".to_string(), "Application".to_string()],
        })
        .expect("dependent node");

    model
        .relationship
        .put(&Relationship {
            id: RELATIONSHIP_ID.to_string(),
            name: "hosted_on".to_string(),
            source_node_id: DEPENDENT_NODE_ID.to_string(),
            target_node_id: DEPENDENCY_NODE_ID.to_string(),
            interfaces: IndexMap::new(),
            attributes: IndexMap::new(),
        })
        .expect("relationship");
}
