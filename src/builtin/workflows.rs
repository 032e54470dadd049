//! Normative lifecycle sequences over the `Standard` node interface and
//! the `Configure` relationship interface.

use crate::api::Result;
use crate::api::task::Task;
use crate::api::task_graph::TaskGraph;
use crate::context::WorkflowContext;
use crate::model::Node;

use super::utils::{create_node_task, create_relationships_tasks};

pub const NORMATIVE_STANDARD_INTERFACE: &str = "Standard";
pub const NORMATIVE_CONFIGURE_INTERFACE: &str = "Configure";

pub const NORMATIVE_CREATE: &str = "create";
pub const NORMATIVE_CONFIGURE: &str = "configure";
pub const NORMATIVE_START: &str = "start";
pub const NORMATIVE_STOP: &str = "stop";
pub const NORMATIVE_DELETE: &str = "delete";

pub const NORMATIVE_PRE_CONFIGURE_SOURCE: &str = "pre_configure_source";
pub const NORMATIVE_PRE_CONFIGURE_TARGET: &str = "pre_configure_target";
pub const NORMATIVE_POST_CONFIGURE_SOURCE: &str = "post_configure_source";
pub const NORMATIVE_POST_CONFIGURE_TARGET: &str = "post_configure_target";

pub const NORMATIVE_ADD_SOURCE: &str = "add_source";
pub const NORMATIVE_ADD_TARGET: &str = "add_target";
pub const NORMATIVE_REMOVE_SOURCE: &str = "remove_source";
pub const NORMATIVE_REMOVE_TARGET: &str = "remove_target";

fn extend(sequence: &mut Vec<Option<Task>>, groups: Vec<Vec<Task>>) {
    for group in groups {
        for task in group {
            sequence.push(Some(task));
        }
    }
}

/// create → pre-configure → configure → post-configure → start.
pub fn install_node(ctx: &WorkflowContext, graph: &mut TaskGraph, node: &Node) -> Result<()> {
    let mut sequence = vec![create_node_task(
        node,
        NORMATIVE_STANDARD_INTERFACE,
        NORMATIVE_CREATE,
    )?];

    extend(
        &mut sequence,
        create_relationships_tasks(
            ctx,
            node,
            NORMATIVE_CONFIGURE_INTERFACE,
            Some(NORMATIVE_PRE_CONFIGURE_SOURCE),
            Some(NORMATIVE_PRE_CONFIGURE_TARGET),
        )?,
    );
    sequence.push(create_node_task(
        node,
        NORMATIVE_STANDARD_INTERFACE,
        NORMATIVE_CONFIGURE,
    )?);
    extend(
        &mut sequence,
        create_relationships_tasks(
            ctx,
            node,
            NORMATIVE_CONFIGURE_INTERFACE,
            Some(NORMATIVE_POST_CONFIGURE_SOURCE),
            Some(NORMATIVE_POST_CONFIGURE_TARGET),
        )?,
    );

    sequence.extend(start_tasks(ctx, node)?);
    graph.sequence(sequence)?;
    Ok(())
}

/// stop → remove → delete.
pub fn uninstall_node(ctx: &WorkflowContext, graph: &mut TaskGraph, node: &Node) -> Result<()> {
    let mut sequence = stop_tasks(ctx, node)?;
    sequence.push(create_node_task(
        node,
        NORMATIVE_STANDARD_INTERFACE,
        NORMATIVE_DELETE,
    )?);
    graph.sequence(sequence)?;
    Ok(())
}

pub fn start_node(ctx: &WorkflowContext, graph: &mut TaskGraph, node: &Node) -> Result<()> {
    let sequence = start_tasks(ctx, node)?;
    graph.sequence(sequence)?;
    Ok(())
}

pub fn stop_node(ctx: &WorkflowContext, graph: &mut TaskGraph, node: &Node) -> Result<()> {
    let sequence = stop_tasks(ctx, node)?;
    graph.sequence(sequence)?;
    Ok(())
}

fn start_tasks(ctx: &WorkflowContext, node: &Node) -> Result<Vec<Option<Task>>> {
    let mut sequence = vec![create_node_task(
        node,
        NORMATIVE_STANDARD_INTERFACE,
        NORMATIVE_START,
    )?];
    extend(
        &mut sequence,
        create_relationships_tasks(
            ctx,
            node,
            NORMATIVE_CONFIGURE_INTERFACE,
            Some(NORMATIVE_ADD_SOURCE),
            Some(NORMATIVE_ADD_TARGET),
        )?,
    );
    Ok(sequence)
}

fn stop_tasks(ctx: &WorkflowContext, node: &Node) -> Result<Vec<Option<Task>>> {
    let mut sequence = vec![create_node_task(
        node,
        NORMATIVE_STANDARD_INTERFACE,
        NORMATIVE_STOP,
    )?];
    extend(
        &mut sequence,
        create_relationships_tasks(
            ctx,
            node,
            NORMATIVE_CONFIGURE_INTERFACE,
            Some(NORMATIVE_REMOVE_SOURCE),
            Some(NORMATIVE_REMOVE_TARGET),
        )?,
    );
    Ok(sequence)
}

/// The `start` built-in: start every node of the service instance.
pub fn start(ctx: &WorkflowContext, graph: &mut TaskGraph) -> Result<()> {
    per_node_sub_workflows(ctx, graph, "start", start_node)
}

/// The `stop` built-in: stop every node of the service instance.
pub fn stop(ctx: &WorkflowContext, graph: &mut TaskGraph) -> Result<()> {
    per_node_sub_workflows(ctx, graph, "stop", stop_node)
}

fn per_node_sub_workflows(
    ctx: &WorkflowContext,
    graph: &mut TaskGraph,
    prefix: &str,
    node_workflow: fn(&WorkflowContext, &mut TaskGraph, &Node) -> Result<()>,
) -> Result<()> {
    for node in ctx.nodes()? {
        let name = format!("{prefix}_{}", node.name);
        let task = Task::workflow_with_context(ctx, &name, |ctx, sub_graph| {
            node_workflow(ctx, sub_graph, &node)
        })?;
        graph.add_tasks(task);
    }
    Ok(())
}
