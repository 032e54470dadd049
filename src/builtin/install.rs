//! Built-in install workflow.

use std::collections::HashMap;

use crate::api::Result;
use crate::api::task::Task;
use crate::api::task_graph::TaskGraph;
use crate::context::WorkflowContext;

use super::workflows::install_node;

/// Install every node of the service instance: one sub-workflow per
/// node, ordered so a node installs only after its relationship
/// targets.
pub fn install(ctx: &WorkflowContext, graph: &mut TaskGraph) -> Result<()> {
    let nodes = ctx.nodes()?;

    let mut sub_workflows: HashMap<String, Task> = HashMap::new();
    for node in &nodes {
        let node = node.clone();
        let name = format!("install_{}", node.name);
        let task = Task::workflow_with_context(ctx, &name, |ctx, sub_graph| {
            install_node(ctx, sub_graph, &node)
        })?;
        graph.add_tasks(task.clone());
        sub_workflows.insert(node.id.clone(), task);
    }

    for node in &nodes {
        let Some(dependent) = sub_workflows.get(&node.id) else {
            continue;
        };
        for relationship_id in &node.outbound_relationship_ids {
            let relationship = ctx.model().relationship.get(relationship_id)?;
            if let Some(dependency) = sub_workflows.get(&relationship.target_node_id) {
                graph.add_dependency(dependent, dependency)?;
            }
        }
    }
    Ok(())
}
