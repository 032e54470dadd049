//! Built-in execute_operation workflow.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

use crate::api::task::{OperationTask, Task, TaskOptions};
use crate::api::task_graph::TaskGraph;
use crate::api::{Error, Result};
use crate::context::WorkflowContext;
use crate::model::Node;

use super::utils::create_node_task_dependencies;

/// Run one operation across the service's nodes.
///
/// Workflow inputs:
/// - `interface` / `operation`: the operation to run (required)
/// - `operation_kwargs`: extra operation inputs (object, optional)
/// - `node_ids`: restrict to these nodes (array, optional)
/// - `type_names`: restrict to nodes carrying one of these types in
///   their hierarchy (array, optional)
/// - `run_by_dependency_order`: order invocations along relationships
///   (bool, default false)
pub fn execute_operation(ctx: &WorkflowContext, graph: &mut TaskGraph) -> Result<()> {
    let parameters = ctx.parameters();
    let interface_name = required_str(parameters.get("interface"), "interface")?;
    let operation_name = required_str(parameters.get("operation"), "operation")?;
    let operation_kwargs = parameters
        .get("operation_kwargs")
        .and_then(Value::as_object)
        .map(|kwargs| {
            kwargs
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<IndexMap<String, Value>>()
        });
    let node_ids = string_list(parameters.get("node_ids"));
    let type_names = string_list(parameters.get("type_names"));
    let by_dependency_order = parameters
        .get("run_by_dependency_order")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let all_nodes = ctx.nodes()?;
    let filtered: Vec<Node> = all_nodes
        .iter()
        .filter(|node| {
            (node_ids.is_empty() || node_ids.contains(&node.id))
                && (type_names.is_empty()
                    || node
                        .type_hierarchy
                        .iter()
                        .any(|type_name| type_names.contains(type_name)))
        })
        .cloned()
        .collect();

    let mut tasks_and_nodes: Vec<(Task, Node)> = Vec::new();
    let mut selected: HashMap<String, ()> = HashMap::new();
    for node in &filtered {
        let task = OperationTask::for_node(
            node,
            &interface_name,
            &operation_name,
            TaskOptions {
                inputs: operation_kwargs.clone(),
                ..TaskOptions::default()
            },
        )?;
        graph.add_tasks(task.clone());
        selected.insert(node.id.clone(), ());
        tasks_and_nodes.push((task, node.clone()));
    }

    if by_dependency_order {
        // Stub anchors keep the ordering intact across unselected nodes.
        for node in &all_nodes {
            if !selected.contains_key(&node.id) {
                let stub = Task::stub();
                graph.add_tasks(stub.clone());
                tasks_and_nodes.push((stub, node.clone()));
            }
        }
        create_node_task_dependencies(ctx, graph, &tasks_and_nodes, false)?;
    }
    Ok(())
}

fn required_str(value: Option<&Value>, name: &str) -> Result<String> {
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Workflow {
            message: format!("execute_operation requires a {name} input"),
        })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
