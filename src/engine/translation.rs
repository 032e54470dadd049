//! Translation of the user graph's API to the execution graph.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use crate::api::task::{Task, TaskKind};
use crate::api::task_graph::TaskGraph;

use super::tasks::{ExecutionTask, ExecutionTaskKind};
use super::{Error, Result};

/// The engine's input: a DAG of execution tasks with edges running from
/// a dependency to each task waiting on it.
#[derive(Debug, Default)]
pub struct ExecutionGraph {
    graph: StableDiGraph<ExecutionTask, ()>,
    indices: HashMap<String, NodeIndex>,
}

impl ExecutionGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<&ExecutionTask> {
        self.indices.get(task_id).map(|index| &self.graph[*index])
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.graph
            .node_indices()
            .map(|index| self.graph[index].id.as_str())
    }

    /// Ids of the tasks `task_id` waits on.
    #[must_use]
    pub fn dependencies(&self, task_id: &str) -> Vec<&str> {
        let Some(index) = self.indices.get(task_id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(*index, Direction::Incoming)
            .map(|neighbor| self.graph[neighbor].id.as_str())
            .collect()
    }

    /// Dependency-respecting order over the whole graph.
    pub fn topological_order(&self) -> Result<Vec<&ExecutionTask>> {
        let sorted = toposort(&self.graph, None).map_err(|_| Error::Translation {
            message: "execution graph contains a cycle".to_string(),
        })?;
        Ok(sorted.into_iter().map(|index| &self.graph[index]).collect())
    }

    fn add_task(&mut self, task: ExecutionTask, depends_on: &[String]) -> Result<()> {
        let id = task.id.clone();
        let index = self.graph.add_node(task);
        self.indices.insert(id, index);
        for dependency in depends_on {
            let dependency_index =
                self.indices
                    .get(dependency)
                    .copied()
                    .ok_or_else(|| Error::Translation {
                        message: format!("unknown dependency {dependency} in execution graph"),
                    })?;
            self.graph.add_edge(dependency_index, index, ());
        }
        Ok(())
    }
}

fn start_id(graph: &TaskGraph) -> String {
    format!("{}-Start", graph.id())
}

fn end_id(graph: &TaskGraph) -> String {
    format!("{}-End", graph.id())
}

/// The execution-graph id an API task resolves to when depended upon: a
/// sub-workflow is represented by its End sentinel so the whole nested
/// graph acts as a single unit.
fn dependency_id(task: &Task) -> String {
    match task.kind() {
        TaskKind::Workflow(inner) => end_id(inner),
        TaskKind::Operation(_) | TaskKind::Stub => task.id().to_string(),
    }
}

/// Translate the user graph into a fresh execution graph, wrapping it
/// with Start/End sentinels and recursively inlining sub-workflows.
pub fn build_execution_graph(task_graph: &TaskGraph) -> Result<ExecutionGraph> {
    let mut execution_graph = ExecutionGraph::new();
    translate(task_graph, &mut execution_graph, false, &[])?;
    Ok(execution_graph)
}

fn translate(
    task_graph: &TaskGraph,
    execution_graph: &mut ExecutionGraph,
    nested: bool,
    depends_on: &[String],
) -> Result<()> {
    let (start_kind, end_kind) = if nested {
        (
            ExecutionTaskKind::StartSubWorkflow,
            ExecutionTaskKind::EndSubWorkflow,
        )
    } else {
        (ExecutionTaskKind::StartWorkflow, ExecutionTaskKind::EndWorkflow)
    };

    let start = start_id(task_graph);
    execution_graph.add_task(
        ExecutionTask::sentinel(
            start.clone(),
            format!("{}-Start", task_graph.name()),
            start_kind,
        ),
        depends_on,
    )?;

    // Dependencies first, so every translated dependency already exists
    // when its dependents are added.
    for task in task_graph.topological_order(true)? {
        let mut dependencies: Vec<String> = task_graph
            .get_dependencies(task.id())?
            .into_iter()
            .map(dependency_id)
            .collect();
        if dependencies.is_empty() {
            dependencies.push(start.clone());
        }

        match task.kind() {
            TaskKind::Operation(operation) => {
                execution_graph.add_task(
                    ExecutionTask::operation(task.id(), (**operation).clone()),
                    &dependencies,
                )?;
            }
            TaskKind::Stub => {
                execution_graph.add_task(
                    ExecutionTask::stub(task.id(), &task.name()),
                    &dependencies,
                )?;
            }
            TaskKind::Workflow(inner) => {
                translate(inner, execution_graph, true, &dependencies)?;
            }
        }
    }

    let mut leaves: Vec<String> = task_graph
        .leaf_tasks()
        .into_iter()
        .map(dependency_id)
        .collect();
    if leaves.is_empty() {
        leaves.push(start.clone());
    }
    execution_graph.add_task(
        ExecutionTask::sentinel(
            end_id(task_graph),
            format!("{}-End", task_graph.name()),
            end_kind,
        ),
        &leaves,
    )?;

    Ok(())
}
