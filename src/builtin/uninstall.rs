//! Built-in uninstall workflow.

use std::collections::HashMap;

use crate::api::Result;
use crate::api::task::Task;
use crate::api::task_graph::TaskGraph;
use crate::context::WorkflowContext;

use super::workflows::uninstall_node;

/// Uninstall every node of the service instance. The dependency
/// direction is the reverse of install: a relationship target comes
/// down only after its sources.
pub fn uninstall(ctx: &WorkflowContext, graph: &mut TaskGraph) -> Result<()> {
    let nodes = ctx.nodes()?;

    let mut sub_workflows: HashMap<String, Task> = HashMap::new();
    for node in &nodes {
        let node = node.clone();
        let name = format!("uninstall_{}", node.name);
        let task = Task::workflow_with_context(ctx, &name, |ctx, sub_graph| {
            uninstall_node(ctx, sub_graph, &node)
        })?;
        graph.add_tasks(task.clone());
        sub_workflows.insert(node.id.clone(), task);
    }

    for node in &nodes {
        let Some(source) = sub_workflows.get(&node.id) else {
            continue;
        };
        for relationship_id in &node.outbound_relationship_ids {
            let relationship = ctx.model().relationship.get(relationship_id)?;
            if let Some(target) = sub_workflows.get(&relationship.target_node_id) {
                graph.add_dependency(target, source)?;
            }
        }
    }
    Ok(())
}
