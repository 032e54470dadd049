use std::collections::HashSet;

use crate::api::task::{OperationTask, RunsOn, Task, TaskOptions};
use crate::api::task_graph::TaskGraph;
use crate::api::Result;
use crate::context::WorkflowContext;
use crate::model::{Node, Relationship};

/// Build an operation task on a node, or a stand-in when the node
/// doesn't carry the operation: a stub for a declared-but-unimplemented
/// operation, nothing at all when the interface or operation is absent.
pub fn create_node_task(
    node: &Node,
    interface_name: &str,
    operation_name: &str,
) -> Result<Option<Task>> {
    match node.interface_operation(interface_name, operation_name) {
        None => Ok(None),
        Some(operation) if operation.implementation.is_none() => Ok(Some(Task::stub())),
        Some(_) => Ok(Some(OperationTask::for_node(
            node,
            interface_name,
            operation_name,
            TaskOptions::default(),
        )?)),
    }
}

/// Source/target operation tasks for every outbound relationship of a
/// node, one group per relationship.
pub fn create_relationships_tasks(
    ctx: &WorkflowContext,
    node: &Node,
    interface_name: &str,
    source_operation_name: Option<&str>,
    target_operation_name: Option<&str>,
) -> Result<Vec<Vec<Task>>> {
    let mut groups = Vec::new();
    for relationship_id in &node.outbound_relationship_ids {
        let relationship = ctx.model().relationship.get(relationship_id)?;
        groups.push(relationship_tasks(
            &relationship,
            interface_name,
            source_operation_name,
            target_operation_name,
        )?);
    }
    Ok(groups)
}

/// The source and target operation tasks of one relationship. Absent
/// operations are skipped, declared-but-unimplemented ones become
/// stubs.
pub fn relationship_tasks(
    relationship: &Relationship,
    interface_name: &str,
    source_operation_name: Option<&str>,
    target_operation_name: Option<&str>,
) -> Result<Vec<Task>> {
    let mut operations = Vec::new();
    for (operation_name, runs_on) in [
        (source_operation_name, RunsOn::Source),
        (target_operation_name, RunsOn::Target),
    ] {
        let Some(operation_name) = operation_name else {
            continue;
        };
        match relationship.interface_operation(interface_name, operation_name) {
            None => {}
            Some(operation) if operation.implementation.is_none() => {
                operations.push(Task::stub());
            }
            Some(_) => {
                operations.push(OperationTask::for_relationship(
                    relationship,
                    interface_name,
                    operation_name,
                    runs_on,
                    TaskOptions::default(),
                )?);
            }
        }
    }
    Ok(operations)
}

/// Link tasks whose nodes are related: each task comes to depend on the
/// tasks of its node's relationship targets (or the other way around
/// with `reverse`).
pub fn create_node_task_dependencies(
    ctx: &WorkflowContext,
    graph: &mut TaskGraph,
    tasks_and_nodes: &[(Task, Node)],
    reverse: bool,
) -> Result<()> {
    let task_for_node = |node_id: &str| {
        tasks_and_nodes
            .iter()
            .find(|(_, node)| node.id == node_id)
            .map(|(task, _)| task)
    };

    for (task, node) in tasks_and_nodes {
        for relationship_id in &node.outbound_relationship_ids {
            let relationship = ctx.model().relationship.get(relationship_id)?;
            if let Some(dependency) = task_for_node(&relationship.target_node_id) {
                if reverse {
                    graph.add_dependency(dependency, task)?;
                } else {
                    graph.add_dependency(task, dependency)?;
                }
            }
        }
    }
    Ok(())
}

/// The nodes contained in `host`, transitively through host
/// containment, including the host itself.
pub fn get_contained_subgraph(ctx: &WorkflowContext, host: &Node) -> Result<Vec<Node>> {
    let nodes = ctx.nodes()?;
    let mut contained_ids: HashSet<String> = HashSet::new();
    contained_ids.insert(host.id.clone());

    // Fixpoint over the containment chain.
    loop {
        let mut grew = false;
        for node in &nodes {
            if contained_ids.contains(&node.id) {
                continue;
            }
            if let Some(host_id) = &node.host_id {
                if contained_ids.contains(host_id) {
                    contained_ids.insert(node.id.clone());
                    grew = true;
                }
            }
        }
        if !grew {
            break;
        }
    }

    Ok(nodes
        .into_iter()
        .filter(|node| contained_ids.contains(&node.id))
        .collect())
}
