//! Task graph → execution graph translation.

mod common;

use weaver::api::TaskGraph;
use weaver::api::task::{OperationTask, Task, TaskOptions};
use weaver::context::WorkflowContext;
use weaver::context::workflow::{WorkflowContextOptions, current};
use weaver::engine::{ExecutionTaskKind, build_execution_graph};

use common::{DEPENDENCY_NODE_ID, SERVICE_INSTANCE_ID, TestEnvironment};

fn workflow_context(env: &TestEnvironment) -> WorkflowContext {
    WorkflowContext::create(
        env.model.clone(),
        env.resource.clone(),
        SERVICE_INSTANCE_ID,
        "test_workflow",
        WorkflowContextOptions::default(),
    )
    .expect("workflow context")
}

fn operation(env: &TestEnvironment, operation_name: &str) -> Task {
    env.set_node_operation(
        DEPENDENCY_NODE_ID,
        "Lifecycle",
        operation_name,
        &format!("tests.ops.{operation_name}"),
    );
    OperationTask::for_node(
        &env.dependency_node(),
        "Lifecycle",
        operation_name,
        TaskOptions::default(),
    )
    .expect("operation task")
}

fn kind_name(kind: &ExecutionTaskKind) -> &'static str {
    match kind {
        ExecutionTaskKind::StartWorkflow => "StartWorkflow",
        ExecutionTaskKind::EndWorkflow => "EndWorkflow",
        ExecutionTaskKind::StartSubWorkflow => "StartSubWorkflow",
        ExecutionTaskKind::EndSubWorkflow => "EndSubWorkflow",
        ExecutionTaskKind::Stub => "Stub",
        ExecutionTaskKind::Operation(_) => "Operation",
    }
}

#[test]
fn empty_graph_translates_to_start_and_end() {
    let graph = TaskGraph::new("empty");
    let execution_graph = build_execution_graph(&graph).unwrap();

    assert_eq!(execution_graph.len(), 2);
    let order = execution_graph.topological_order().unwrap();
    assert!(matches!(order[0].kind, ExecutionTaskKind::StartWorkflow));
    assert!(matches!(order[1].kind, ExecutionTaskKind::EndWorkflow));
    assert_eq!(order[0].id, format!("{}-Start", graph.id()));
    assert_eq!(order[1].id, format!("{}-End", graph.id()));
}

#[test]
fn sub_workflow_expands_between_sentinels() {
    let env = TestEnvironment::new();
    let ctx = workflow_context(&env);
    let _scope = current::push(&ctx);

    // before → [ op1 → Stub → op2 ] → after
    let before = operation(&env, "before");
    let after = operation(&env, "after");
    let op1 = operation(&env, "op1");
    let op2 = operation(&env, "op2");

    let sub_workflow = Task::workflow("inner", |_, inner| {
        inner.sequence(vec![op1.clone(), Task::stub(), op2.clone()])?;
        Ok(())
    })
    .unwrap();

    let mut graph = TaskGraph::new("outer");
    graph.add_tasks(before.clone());
    graph.add_tasks(after.clone());
    graph.add_tasks(sub_workflow.clone());
    graph.add_dependency(&sub_workflow, &before).unwrap();
    graph.add_dependency(&after, &sub_workflow).unwrap();

    let execution_graph = build_execution_graph(&graph).unwrap();
    assert_eq!(execution_graph.len(), 9);

    let order = execution_graph.topological_order().unwrap();
    let kinds: Vec<&str> = order.iter().map(|task| kind_name(&task.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            "StartWorkflow",
            "Operation", // before
            "StartSubWorkflow",
            "Operation", // op1
            "Stub",
            "Operation", // op2
            "EndSubWorkflow",
            "Operation", // after
            "EndWorkflow",
        ]
    );
    assert_eq!(order[1].id, before.id());
    assert_eq!(order[3].id, op1.id());
    assert_eq!(order[5].id, op2.id());
    assert_eq!(order[7].id, after.id());
}

#[test]
fn operation_order_is_preserved_exactly() {
    let env = TestEnvironment::new();
    let ctx = workflow_context(&env);
    let _scope = current::push(&ctx);

    // a → b, a → c, {b,c} → d. Between operations, the translated
    // partial order must match the API partial order exactly.
    let a = operation(&env, "a");
    let b = operation(&env, "b");
    let c = operation(&env, "c");
    let d = operation(&env, "d");

    let mut graph = TaskGraph::new("diamond");
    graph.add_tasks(vec![a.clone(), b.clone(), c.clone(), d.clone()]);
    graph.add_dependency(&b, &a).unwrap();
    graph.add_dependency(&c, &a).unwrap();
    graph.add_dependency(&d, vec![&b, &c]).unwrap();

    let execution_graph = build_execution_graph(&graph).unwrap();
    let order = execution_graph.topological_order().unwrap();
    let position = |task: &Task| order.iter().position(|t| t.id == task.id()).unwrap();

    assert!(position(&a) < position(&b));
    assert!(position(&a) < position(&c));
    assert!(position(&b) < position(&d));
    assert!(position(&c) < position(&d));

    // And no ordering was invented between the independent pair.
    assert_eq!(execution_graph.dependencies(b.id()), vec![a.id()]);
    assert_eq!(execution_graph.dependencies(c.id()), vec![a.id()]);
    let d_dependencies: std::collections::HashSet<&str> =
        execution_graph.dependencies(d.id()).into_iter().collect();
    assert_eq!(
        d_dependencies,
        [b.id(), c.id()].into_iter().collect::<std::collections::HashSet<&str>>()
    );
}
