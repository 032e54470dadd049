//! Built-in heal workflow.

use std::collections::{HashMap, HashSet};

use crate::api::task::Task;
use crate::api::task_graph::TaskGraph;
use crate::api::{Error, Result};
use crate::context::WorkflowContext;
use crate::model::Node;

use super::utils::get_contained_subgraph;
use super::workflows::{install_node, uninstall_node};

/// Heal a failing node: tear down the contained subgraph of its host
/// and bring it back up, leaving intact nodes in place as ordering
/// anchors.
///
/// Workflow input: `node_id`, the failing node.
pub fn heal(ctx: &WorkflowContext, graph: &mut TaskGraph) -> Result<()> {
    let node_id = ctx
        .parameters()
        .get("node_id")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| Error::Workflow {
            message: "heal requires a node_id input".to_string(),
        })?;

    let failing_node = ctx.model().node.get(node_id)?;
    let host_id = failing_node
        .host_id
        .clone()
        .unwrap_or_else(|| failing_node.id.clone());
    let host_node = ctx.model().node.get(&host_id)?;

    let failing_nodes = get_contained_subgraph(ctx, &host_node)?;
    let failing_ids: HashSet<String> =
        failing_nodes.iter().map(|node| node.id.clone()).collect();
    let targeted_nodes: Vec<Node> = ctx
        .nodes()?
        .into_iter()
        .filter(|node| !failing_ids.contains(&node.id))
        .collect();

    let uninstall_sub = {
        let failing = failing_nodes.clone();
        let targeted = targeted_nodes.clone();
        Task::workflow_with_context(ctx, "heal_uninstall", move |ctx, sub_graph| {
            heal_uninstall(ctx, sub_graph, &failing, &targeted)
        })?
    };
    let install_sub = Task::workflow_with_context(ctx, "heal_install", move |ctx, sub_graph| {
        heal_install(ctx, sub_graph, &failing_nodes, &targeted_nodes)
    })?;

    graph.sequence(vec![uninstall_sub, install_sub])?;
    Ok(())
}

/// The uninstall half: tear down failing nodes in reverse relationship
/// order, with stub anchors standing in for the intact nodes.
fn heal_uninstall(
    ctx: &WorkflowContext,
    graph: &mut TaskGraph,
    failing_nodes: &[Node],
    targeted_nodes: &[Node],
) -> Result<()> {
    let mut sub_workflows: HashMap<String, Task> = HashMap::new();

    for node in targeted_nodes {
        let stub = Task::stub();
        graph.add_tasks(stub.clone());
        sub_workflows.insert(node.id.clone(), stub);
    }
    for node in failing_nodes {
        let owned = node.clone();
        let name = format!("uninstall_{}", node.name);
        let task = Task::workflow_with_context(ctx, &name, move |ctx, sub_graph| {
            uninstall_node(ctx, sub_graph, &owned)
        })?;
        graph.add_tasks(task.clone());
        sub_workflows.insert(node.id.clone(), task);
    }

    // Teardown order: a relationship target waits for its sources.
    link_by_relationships(ctx, graph, failing_nodes.iter().chain(targeted_nodes), &sub_workflows, true)
}

/// The install half: bring failing nodes back in forward relationship
/// order.
fn heal_install(
    ctx: &WorkflowContext,
    graph: &mut TaskGraph,
    failing_nodes: &[Node],
    targeted_nodes: &[Node],
) -> Result<()> {
    let mut sub_workflows: HashMap<String, Task> = HashMap::new();

    for node in targeted_nodes {
        let stub = Task::stub();
        graph.add_tasks(stub.clone());
        sub_workflows.insert(node.id.clone(), stub);
    }
    for node in failing_nodes {
        let owned = node.clone();
        let name = format!("install_{}", node.name);
        let task = Task::workflow_with_context(ctx, &name, move |ctx, sub_graph| {
            install_node(ctx, sub_graph, &owned)
        })?;
        graph.add_tasks(task.clone());
        sub_workflows.insert(node.id.clone(), task);
    }

    link_by_relationships(ctx, graph, failing_nodes.iter().chain(targeted_nodes), &sub_workflows, false)
}

fn link_by_relationships<'a>(
    ctx: &WorkflowContext,
    graph: &mut TaskGraph,
    nodes: impl Iterator<Item = &'a Node>,
    sub_workflows: &HashMap<String, Task>,
    reverse: bool,
) -> Result<()> {
    for node in nodes {
        let Some(source) = sub_workflows.get(&node.id) else {
            continue;
        };
        for relationship_id in &node.outbound_relationship_ids {
            let relationship = ctx.model().relationship.get(relationship_id)?;
            let Some(target) = sub_workflows.get(&relationship.target_node_id) else {
                continue;
            };
            if reverse {
                graph.add_dependency(target, source)?;
            } else {
                graph.add_dependency(source, target)?;
            }
        }
    }
    Ok(())
}
