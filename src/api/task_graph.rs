//! The task graph builder used by workflow functions.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use super::task::Task;
use super::{Error, Result};

/// Accepts a task, an optional task, or arbitrarily nested collections
/// of them. Nesting is flattened and `None` entries are filtered out,
/// so helpers that may produce no task compose directly.
pub trait IntoTasks {
    fn collect_tasks(self, out: &mut Vec<Task>);
}

impl IntoTasks for Task {
    fn collect_tasks(self, out: &mut Vec<Task>) {
        out.push(self);
    }
}

impl IntoTasks for Option<Task> {
    fn collect_tasks(self, out: &mut Vec<Task>) {
        if let Some(task) = self {
            out.push(task);
        }
    }
}

impl<T: IntoTasks> IntoTasks for Vec<T> {
    fn collect_tasks(self, out: &mut Vec<Task>) {
        for item in self {
            item.collect_tasks(out);
        }
    }
}

/// A reference to one or more graph members, by task or by id.
pub trait TaskRefs {
    fn collect_ids(&self, out: &mut Vec<String>);
}

impl TaskRefs for Task {
    fn collect_ids(&self, out: &mut Vec<String>) {
        out.push(self.id().to_string());
    }
}

impl TaskRefs for str {
    fn collect_ids(&self, out: &mut Vec<String>) {
        out.push(self.to_string());
    }
}

impl TaskRefs for String {
    fn collect_ids(&self, out: &mut Vec<String>) {
        out.push(self.clone());
    }
}

impl<T: TaskRefs + ?Sized> TaskRefs for &T {
    fn collect_ids(&self, out: &mut Vec<String>) {
        (*self).collect_ids(out);
    }
}

impl<T: TaskRefs> TaskRefs for [T] {
    fn collect_ids(&self, out: &mut Vec<String>) {
        for item in self {
            item.collect_ids(out);
        }
    }
}

impl<T: TaskRefs> TaskRefs for Vec<T> {
    fn collect_ids(&self, out: &mut Vec<String>) {
        for item in self {
            item.collect_ids(out);
        }
    }
}

fn ids_of(refs: impl TaskRefs) -> Vec<String> {
    let mut ids = Vec::new();
    refs.collect_ids(&mut ids);
    ids
}

/// A tasks graph builder: nodes are tasks, edges point from a dependent
/// to each of its dependencies. The dependent may only start after every
/// dependency terminates.
///
/// Members are resolved through an id table, so tasks can be referred to
/// after insertion by value or by id interchangeably.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    id: String,
    name: String,
    graph: StableDiGraph<String, ()>,
    tasks: HashMap<String, Task>,
    indices: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            graph: StableDiGraph::new(),
            tasks: HashMap::new(),
            indices: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Iterate over the tasks in the graph, in insertion-independent
    /// order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    fn index(&self, task_id: &str) -> Result<NodeIndex> {
        self.indices
            .get(task_id)
            .copied()
            .ok_or_else(|| Error::TaskNotInGraph {
                task_id: task_id.to_string(),
            })
    }

    pub fn get_task(&self, task_id: &str) -> Result<&Task> {
        self.tasks.get(task_id).ok_or_else(|| Error::TaskNotInGraph {
            task_id: task_id.to_string(),
        })
    }

    /// Add tasks to the graph; already-present tasks are skipped.
    /// Returns the ids of the tasks actually added.
    pub fn add_tasks(&mut self, tasks: impl IntoTasks) -> Vec<String> {
        let mut flattened = Vec::new();
        tasks.collect_tasks(&mut flattened);

        let mut added = Vec::new();
        for task in flattened {
            let id = task.id().to_string();
            if self.tasks.contains_key(&id) {
                continue;
            }
            let index = self.graph.add_node(id.clone());
            self.indices.insert(id.clone(), index);
            self.tasks.insert(id.clone(), task);
            added.push(id);
        }
        added
    }

    /// Remove tasks and their incident dependency edges. Returns the
    /// ids of the tasks actually removed.
    pub fn remove_tasks(&mut self, tasks: impl TaskRefs) -> Vec<String> {
        let mut removed = Vec::new();
        for id in ids_of(tasks) {
            if let Some(index) = self.indices.remove(&id) {
                self.graph.remove_node(index);
                self.tasks.remove(&id);
                removed.push(id);
            }
        }
        removed
    }

    /// Whether every referenced task is a member of the graph.
    #[must_use]
    pub fn has_tasks(&self, tasks: impl TaskRefs) -> bool {
        ids_of(tasks).iter().all(|id| self.tasks.contains_key(id))
    }

    /// Make every `dependent` depend on every `dependency`.
    ///
    /// Returns true if at least one new edge was added; re-adding an
    /// existing pair is a no-op returning false. A self-edge or an edge
    /// that would close a cycle is rejected.
    pub fn add_dependency(
        &mut self,
        dependent: impl TaskRefs,
        dependency: impl TaskRefs,
    ) -> Result<bool> {
        let dependents = ids_of(dependent);
        let dependencies = ids_of(dependency);
        for id in dependents.iter().chain(dependencies.iter()) {
            self.index(id)?;
        }

        let mut added = false;
        for dependent_id in &dependents {
            for dependency_id in &dependencies {
                if dependent_id == dependency_id {
                    return Err(Error::SelfDependency {
                        task_id: dependent_id.clone(),
                    });
                }
                let from = self.index(dependent_id)?;
                let to = self.index(dependency_id)?;
                if self.graph.find_edge(from, to).is_some() {
                    continue;
                }
                // Reject at add time rather than letting a later
                // traversal discover the cycle.
                if has_path_connecting(&self.graph, to, from, None) {
                    return Err(Error::DependencyCycle {
                        dependent: dependent_id.clone(),
                        dependency: dependency_id.clone(),
                    });
                }
                self.graph.add_edge(from, to, ());
                added = true;
            }
        }
        Ok(added)
    }

    /// Whether every `dependent`/`dependency` pair is linked.
    pub fn has_dependency(
        &self,
        dependent: impl TaskRefs,
        dependency: impl TaskRefs,
    ) -> Result<bool> {
        let dependents = ids_of(dependent);
        let dependencies = ids_of(dependency);
        if dependents.is_empty() || dependencies.is_empty() {
            return Ok(false);
        }
        for id in dependents.iter().chain(dependencies.iter()) {
            self.index(id)?;
        }
        for dependent_id in &dependents {
            for dependency_id in &dependencies {
                let from = self.index(dependent_id)?;
                let to = self.index(dependency_id)?;
                if self.graph.find_edge(from, to).is_none() {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Remove the dependency edges between every pair. Pairs that are
    /// not all linked leave the graph unchanged and return false.
    pub fn remove_dependency(
        &mut self,
        dependent: impl TaskRefs,
        dependency: impl TaskRefs,
    ) -> Result<bool> {
        let dependents = ids_of(dependent);
        let dependencies = ids_of(dependency);
        if !self.has_dependency(dependents.clone(), dependencies.clone())? {
            return Ok(false);
        }
        for dependent_id in &dependents {
            for dependency_id in &dependencies {
                let from = self.index(dependent_id)?;
                let to = self.index(dependency_id)?;
                if let Some(edge) = self.graph.find_edge(from, to) {
                    self.graph.remove_edge(edge);
                }
            }
        }
        Ok(true)
    }

    /// The tasks `dependent` depends on.
    pub fn get_dependencies(&self, dependent: impl TaskRefs) -> Result<Vec<&Task>> {
        let mut dependencies = Vec::new();
        for id in ids_of(dependent) {
            let index = self.index(&id)?;
            for neighbor in self.graph.neighbors_directed(index, Direction::Outgoing) {
                dependencies.push(self.get_task(&self.graph[neighbor])?);
            }
        }
        Ok(dependencies)
    }

    /// The tasks depending on `dependency`.
    pub fn get_dependents(&self, dependency: impl TaskRefs) -> Result<Vec<&Task>> {
        let mut dependents = Vec::new();
        for id in ids_of(dependency) {
            let index = self.index(&id)?;
            for neighbor in self.graph.neighbors_directed(index, Direction::Incoming) {
                dependents.push(self.get_task(&self.graph[neighbor])?);
            }
        }
        Ok(dependents)
    }

    /// Tasks nothing depends on.
    #[must_use]
    pub fn leaf_tasks(&self) -> Vec<&Task> {
        self.graph
            .node_indices()
            .filter(|index| {
                self.graph
                    .neighbors_directed(*index, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .filter_map(|index| self.tasks.get(&self.graph[index]))
            .collect()
    }

    /// Topological sort over the dependency edges. The default order
    /// lists dependents before their dependencies; `reverse` flips it,
    /// yielding dependencies first.
    pub fn topological_order(&self, reverse: bool) -> Result<Vec<&Task>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            // Unreachable as long as add_dependency holds the line.
            Error::DependencyCycle {
                dependent: self.graph[cycle.node_id()].clone(),
                dependency: self.graph[cycle.node_id()].clone(),
            }
        })?;
        let mut tasks = Vec::with_capacity(sorted.len());
        for index in sorted {
            tasks.push(self.get_task(&self.graph[index])?);
        }
        if reverse {
            tasks.reverse();
        }
        Ok(tasks)
    }

    /// Add the tasks and chain them: each task depends on the previous
    /// one. Returns the flattened ids in sequence order.
    pub fn sequence(&mut self, tasks: impl IntoTasks) -> Result<Vec<String>> {
        let mut flattened = Vec::new();
        tasks.collect_tasks(&mut flattened);

        let ids: Vec<String> = flattened.iter().map(|task| task.id().to_string()).collect();
        self.add_tasks(flattened);
        for pair in ids.windows(2) {
            self.add_dependency(pair[1].as_str(), pair[0].as_str())?;
        }
        Ok(ids)
    }
}
