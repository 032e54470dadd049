//! Built-in workflow behavior: install/uninstall ordering, heal,
//! execute_operation, and registry policy.

mod common;

use std::sync::{Arc, Mutex};

use serde_json::json;
use weaver::api::TaskGraph;
use weaver::api::task::TaskKind;
use weaver::builtin::{self, WorkflowRegistry};
use weaver::context::WorkflowContext;
use weaver::context::workflow::{WorkflowContextOptions, current};
use weaver::executor::{FunctionRegistry, ThreadExecutor};
use weaver::model::ExecutionStatus;
use weaver::runner::{RunnerOptions, WorkflowRunner};

use common::{
    DEPENDENCY_NODE_ID, DEPENDENCY_NODE_NAME, DEPENDENT_NODE_ID, DEPENDENT_NODE_NAME,
    SERVICE_INSTANCE_ID, TestEnvironment,
};

/// Declare `operations` on both nodes, each implementation recording
/// `"{operation}@{node_name}"` into the shared log.
fn declare_lifecycle(
    env: &TestEnvironment,
    registry: &FunctionRegistry,
    operations: &[&str],
    log: &Arc<Mutex<Vec<String>>>,
) {
    for operation in operations {
        let function = format!("tests.lifecycle.{operation}");
        for node_id in [DEPENDENCY_NODE_ID, DEPENDENT_NODE_ID] {
            env.set_node_operation(node_id, "Standard", operation, &function);
        }
        let sink = Arc::clone(log);
        let operation = (*operation).to_string();
        registry.register(&function, move |ctx, _| {
            let node = ctx.node().map_err(|e| e.to_string())?;
            sink.lock().unwrap().push(format!("{operation}@{}", node.name));
            Ok(())
        });
    }
}

fn run_builtin(
    env: &TestEnvironment,
    registry: FunctionRegistry,
    name: &str,
    parameters: indexmap::IndexMap<String, serde_json::Value>,
) -> WorkflowRunner {
    let workflows = WorkflowRegistry::with_builtins();
    let workflow_fn = workflows.get(name).expect("builtin workflow");
    WorkflowRunner::new(
        env.model.clone(),
        env.resource.clone(),
        SERVICE_INSTANCE_ID,
        name,
        move |ctx, graph| workflow_fn(ctx, graph),
        Arc::new(ThreadExecutor::new(registry, 4)),
        RunnerOptions {
            parameters,
            hub: env.hub.clone(),
            ..RunnerOptions::default()
        },
    )
    .expect("runner")
}

fn node_position(log: &[String], entry: &str) -> usize {
    log.iter().position(|line| line == entry).unwrap_or_else(|| {
        panic!("{entry} missing from {log:?}");
    })
}

#[test]
fn install_builds_one_sub_workflow_per_node() {
    let env = TestEnvironment::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    declare_lifecycle(&env, &FunctionRegistry::new(), &["create"], &log);

    let ctx = WorkflowContext::create(
        env.model.clone(),
        env.resource.clone(),
        SERVICE_INSTANCE_ID,
        "install",
        WorkflowContextOptions::default(),
    )
    .unwrap();
    let _scope = current::push(&ctx);

    let mut graph = TaskGraph::new("install");
    builtin::install(&ctx, &mut graph).unwrap();

    assert_eq!(graph.len(), 2);
    let workflow_tasks: Vec<_> = graph
        .tasks()
        .filter(|task| matches!(task.kind(), TaskKind::Workflow(_)))
        .collect();
    assert_eq!(workflow_tasks.len(), 2);

    // The dependent node's sub-workflow depends on its target's.
    let dependent = graph
        .tasks()
        .find(|task| task.name().contains(DEPENDENT_NODE_NAME))
        .unwrap();
    let dependencies = graph.get_dependencies(dependent).unwrap();
    assert_eq!(dependencies.len(), 1);
    assert!(dependencies[0].name().contains(DEPENDENCY_NODE_NAME));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn install_runs_dependencies_before_dependents() {
    let env = TestEnvironment::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = FunctionRegistry::new();
    declare_lifecycle(&env, &registry, &["create", "start"], &log);

    // A relationship operation sits between create and start on the
    // source node's sequence.
    env.set_relationship_operation(
        "Configure",
        "pre_configure_source",
        "tests.lifecycle.pre_configure_source",
    );
    let sink = Arc::clone(&log);
    registry.register("tests.lifecycle.pre_configure_source", move |ctx, _| {
        let source = ctx.source_node().map_err(|e| e.to_string())?;
        sink.lock()
            .unwrap()
            .push(format!("pre_configure_source@{}", source.name));
        Ok(())
    });

    let runner = run_builtin(&env, registry, "install", indexmap::IndexMap::new());
    runner.execute().await.expect("install");

    assert_eq!(
        runner.execution().unwrap().status(),
        ExecutionStatus::Terminated
    );
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 5);
    // Every dependency-node operation precedes every dependent-node one.
    assert!(
        node_position(&log, &format!("start@{DEPENDENCY_NODE_NAME}"))
            < node_position(&log, &format!("create@{DEPENDENT_NODE_NAME}"))
    );
    // And within one node the normative sequence holds.
    assert!(
        node_position(&log, &format!("create@{DEPENDENCY_NODE_NAME}"))
            < node_position(&log, &format!("start@{DEPENDENCY_NODE_NAME}"))
    );
    assert!(
        node_position(&log, &format!("create@{DEPENDENT_NODE_NAME}"))
            < node_position(&log, &format!("pre_configure_source@{DEPENDENT_NODE_NAME}"))
    );
    assert!(
        node_position(&log, &format!("pre_configure_source@{DEPENDENT_NODE_NAME}"))
            < node_position(&log, &format!("start@{DEPENDENT_NODE_NAME}"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn uninstall_runs_in_reverse_dependency_order() {
    let env = TestEnvironment::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = FunctionRegistry::new();
    declare_lifecycle(&env, &registry, &["stop", "delete"], &log);

    let runner = run_builtin(&env, registry, "uninstall", indexmap::IndexMap::new());
    runner.execute().await.expect("uninstall");

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 4);
    assert!(
        node_position(&log, &format!("delete@{DEPENDENT_NODE_NAME}"))
            < node_position(&log, &format!("stop@{DEPENDENCY_NODE_NAME}"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn heal_tears_down_and_reinstalls_the_failing_subgraph() {
    let env = TestEnvironment::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = FunctionRegistry::new();
    declare_lifecycle(
        &env,
        &registry,
        &["create", "start", "stop", "delete"],
        &log,
    );

    let runner = run_builtin(
        &env,
        registry,
        "heal",
        [("node_id".to_string(), json!(DEPENDENT_NODE_ID))]
            .into_iter()
            .collect(),
    );
    runner.execute().await.expect("heal");

    let log = log.lock().unwrap();
    // Only the failing node cycles; the intact dependency node is an
    // anchor and runs nothing.
    let expected = [
        format!("stop@{DEPENDENT_NODE_NAME}"),
        format!("delete@{DEPENDENT_NODE_NAME}"),
        format!("create@{DEPENDENT_NODE_NAME}"),
        format!("start@{DEPENDENT_NODE_NAME}"),
    ];
    assert_eq!(log.as_slice(), &expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn execute_operation_filters_nodes() {
    let env = TestEnvironment::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = FunctionRegistry::new();

    for node_id in [DEPENDENCY_NODE_ID, DEPENDENT_NODE_ID] {
        env.set_node_operation(node_id, "Maintenance", "probe", "tests.maintenance.probe");
    }
    let sink = Arc::clone(&log);
    registry.register("tests.maintenance.probe", move |ctx, inputs| {
        let node = ctx.node().map_err(|e| e.to_string())?;
        let level = inputs
            .get("level")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("default");
        sink.lock().unwrap().push(format!("probe@{}:{level}", node.name));
        Ok(())
    });

    let runner = run_builtin(
        &env,
        registry,
        "execute_operation",
        [
            ("interface".to_string(), json!("Maintenance")),
            ("operation".to_string(), json!("probe")),
            ("operation_kwargs".to_string(), json!({"level": "deep"})),
            ("node_ids".to_string(), json!([DEPENDENCY_NODE_ID])),
        ]
        .into_iter()
        .collect(),
    );
    runner.execute().await.expect("execute_operation");

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[format!("probe@{DEPENDENCY_NODE_NAME}:deep")]
    );
}

#[test]
fn reserved_workflow_names_cannot_be_shadowed() {
    let workflows = WorkflowRegistry::with_builtins();
    let result = workflows.register("install", Arc::new(|_, _| Ok(())));
    assert!(matches!(result, Err(builtin::Error::ReservedName { .. })));

    workflows
        .register("my_workflow", Arc::new(|_, _| Ok(())))
        .expect("custom name is fine");
    assert!(workflows.get("my_workflow").is_ok());
}

#[test]
fn reserved_argument_names_are_rejected() {
    let env = TestEnvironment::new();
    let result = WorkflowRunner::new(
        env.model.clone(),
        env.resource.clone(),
        SERVICE_INSTANCE_ID,
        "custom",
        |_, _| Ok(()),
        Arc::new(ThreadExecutor::new(FunctionRegistry::new(), 1)),
        RunnerOptions {
            parameters: [("ctx".to_string(), json!(1))].into_iter().collect(),
            ..RunnerOptions::default()
        },
    );
    assert!(matches!(
        result,
        Err(weaver::runner::Error::ReservedArgument { .. })
    ));
}
