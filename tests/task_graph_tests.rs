//! Task graph builder invariants.

use weaver::api::task::Task;
use weaver::api::{Error, TaskGraph};

fn stubs(count: usize) -> Vec<Task> {
    (0..count).map(|_| Task::stub()).collect()
}

#[test]
fn add_has_get_remove_tasks() {
    let mut graph = TaskGraph::new("test");
    let tasks = stubs(3);
    let added = graph.add_tasks(tasks.clone());
    assert_eq!(added.len(), 3);
    assert_eq!(graph.len(), 3);
    assert!(graph.has_tasks(&tasks));
    assert_eq!(graph.get_task(tasks[0].id()).unwrap().id(), tasks[0].id());

    // Re-adding is a no-op.
    assert!(graph.add_tasks(tasks[0].clone()).is_empty());
    assert_eq!(graph.len(), 3);

    let removed = graph.remove_tasks(&tasks[1]);
    assert_eq!(removed, vec![tasks[1].id().to_string()]);
    assert!(!graph.has_tasks(&tasks[1]));
    assert!(matches!(
        graph.get_task(tasks[1].id()),
        Err(Error::TaskNotInGraph { .. })
    ));
}

#[test]
fn nested_and_empty_arguments_are_flattened() {
    let mut graph = TaskGraph::new("test");
    let a = Task::stub();
    let b = Task::stub();
    let added = graph.add_tasks(vec![
        vec![Some(a.clone()), None],
        vec![Some(b.clone())],
        vec![],
    ]);
    assert_eq!(added.len(), 2);
    assert!(graph.has_tasks(vec![a, b]));
}

#[test]
fn add_dependency_links_and_is_idempotent() {
    let mut graph = TaskGraph::new("test");
    let tasks = stubs(2);
    graph.add_tasks(tasks.clone());

    assert!(graph.add_dependency(&tasks[1], &tasks[0]).unwrap());
    assert!(graph.has_dependency(&tasks[1], &tasks[0]).unwrap());
    // Existing pair: no-op returning false.
    assert!(!graph.add_dependency(&tasks[1], &tasks[0]).unwrap());

    let dependencies = graph.get_dependencies(&tasks[1]).unwrap();
    assert_eq!(dependencies.len(), 1);
    assert_eq!(dependencies[0].id(), tasks[0].id());
    let dependents = graph.get_dependents(&tasks[0]).unwrap();
    assert_eq!(dependents.len(), 1);
    assert_eq!(dependents[0].id(), tasks[1].id());
}

#[test]
fn dependency_on_unknown_task_fails() {
    let mut graph = TaskGraph::new("test");
    let member = Task::stub();
    let stranger = Task::stub();
    graph.add_tasks(member.clone());

    assert!(matches!(
        graph.add_dependency(&member, &stranger),
        Err(Error::TaskNotInGraph { .. })
    ));
    assert!(matches!(
        graph.has_dependency(&member, &stranger),
        Err(Error::TaskNotInGraph { .. })
    ));
}

#[test]
fn self_dependency_is_rejected() {
    let mut graph = TaskGraph::new("test");
    let task = Task::stub();
    graph.add_tasks(task.clone());
    assert!(matches!(
        graph.add_dependency(&task, &task),
        Err(Error::SelfDependency { .. })
    ));
}

#[test]
fn cycle_is_rejected_at_edge_add_time() {
    let mut graph = TaskGraph::new("test");
    let tasks = stubs(3);
    graph.add_tasks(tasks.clone());
    graph.add_dependency(&tasks[1], &tasks[0]).unwrap();
    graph.add_dependency(&tasks[2], &tasks[1]).unwrap();
    assert!(matches!(
        graph.add_dependency(&tasks[0], &tasks[2]),
        Err(Error::DependencyCycle { .. })
    ));
}

#[test]
fn remove_task_removes_incident_edges() {
    let mut graph = TaskGraph::new("test");
    let tasks = stubs(3);
    graph.add_tasks(tasks.clone());
    graph.add_dependency(&tasks[1], &tasks[0]).unwrap();
    graph.add_dependency(&tasks[2], &tasks[1]).unwrap();

    graph.remove_tasks(&tasks[1]);
    assert!(graph.get_dependents(&tasks[0]).unwrap().is_empty());
    assert!(graph.get_dependencies(&tasks[2]).unwrap().is_empty());
}

#[test]
fn remove_dependency_requires_all_pairs() {
    let mut graph = TaskGraph::new("test");
    let tasks = stubs(3);
    graph.add_tasks(tasks.clone());
    graph.add_dependency(&tasks[2], &tasks[0]).unwrap();

    // tasks[2] depends on tasks[0] but not tasks[1]: nothing removed.
    assert!(
        !graph
            .remove_dependency(&tasks[2], vec![&tasks[0], &tasks[1]])
            .unwrap()
    );
    assert!(graph.has_dependency(&tasks[2], &tasks[0]).unwrap());

    assert!(graph.remove_dependency(&tasks[2], &tasks[0]).unwrap());
    assert!(!graph.has_dependency(&tasks[2], &tasks[0]).unwrap());
}

#[test]
fn sequence_chains_tasks() {
    let mut graph = TaskGraph::new("test");
    let tasks = stubs(4);
    let ids = graph.sequence(tasks.clone()).unwrap();
    assert_eq!(ids.len(), 4);
    for pair in tasks.windows(2) {
        assert!(graph.has_dependency(&pair[1], &pair[0]).unwrap());
    }
}

#[test]
fn topological_order_respects_every_edge() {
    let mut graph = TaskGraph::new("test");
    let tasks = stubs(6);
    graph.add_tasks(tasks.clone());
    // A diamond plus a tail.
    graph.add_dependency(&tasks[1], &tasks[0]).unwrap();
    graph.add_dependency(&tasks[2], &tasks[0]).unwrap();
    graph.add_dependency(&tasks[3], &tasks[1]).unwrap();
    graph.add_dependency(&tasks[3], &tasks[2]).unwrap();
    graph.add_dependency(&tasks[4], &tasks[3]).unwrap();

    let order = graph.topological_order(false).unwrap();
    assert_eq!(order.len(), 6);
    let position = |task: &weaver::api::task::Task| {
        order
            .iter()
            .position(|member| member.id() == task.id())
            .unwrap()
    };
    // Default order lists dependents before their dependencies.
    for (dependent, dependency) in [
        (&tasks[1], &tasks[0]),
        (&tasks[2], &tasks[0]),
        (&tasks[3], &tasks[1]),
        (&tasks[3], &tasks[2]),
        (&tasks[4], &tasks[3]),
    ] {
        assert!(position(dependent) < position(dependency));
    }

    let reversed = graph.topological_order(true).unwrap();
    let reversed_position = |task: &weaver::api::task::Task| {
        reversed
            .iter()
            .position(|member| member.id() == task.id())
            .unwrap()
    };
    // Reversed order yields dependencies first.
    assert!(reversed_position(&tasks[0]) < reversed_position(&tasks[1]));
    assert!(reversed_position(&tasks[3]) < reversed_position(&tasks[4]));
}
