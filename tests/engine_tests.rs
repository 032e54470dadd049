//! End-to-end engine scenarios: empty graphs, ordering, retries,
//! failures and cancellation, driven through the thread executor.

mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use serde_json::json;
use weaver::api::task::{OperationTask, Task, TaskOptions};
use weaver::engine;
use weaver::executor::{FunctionRegistry, ThreadExecutor};
use weaver::model::ExecutionStatus;
use weaver::runner::{RunnerOptions, WorkflowRunner};

use common::{SERVICE_INSTANCE_ID, TestEnvironment};

const LIFECYCLE_INTERFACE: &str = "Lifecycle";
const CREATE_OPERATION: &str = "create";

fn runner(
    env: &TestEnvironment,
    registry: FunctionRegistry,
    workflow_fn: impl FnOnce(
        &weaver::context::WorkflowContext,
        &mut weaver::api::TaskGraph,
    ) -> weaver::api::Result<()>,
) -> WorkflowRunner {
    WorkflowRunner::new(
        env.model.clone(),
        env.resource.clone(),
        SERVICE_INSTANCE_ID,
        "test_workflow",
        workflow_fn,
        Arc::new(ThreadExecutor::new(registry, 4)),
        RunnerOptions {
            hub: env.hub.clone(),
            ..RunnerOptions::default()
        },
    )
    .expect("runner")
}

/// Declare `function` as the create operation on the dependency node
/// and build an operation task for it.
fn op(env: &TestEnvironment, function: &str, options: TaskOptions) -> weaver::api::Result<Task> {
    env.set_node_operation(
        common::DEPENDENCY_NODE_ID,
        LIFECYCLE_INTERFACE,
        CREATE_OPERATION,
        function,
    );
    OperationTask::for_node(
        &env.dependency_node(),
        LIFECYCLE_INTERFACE,
        CREATE_OPERATION,
        options,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_graph_execution() {
    let env = TestEnvironment::new();
    let runner = runner(&env, FunctionRegistry::new(), |_, _| Ok(()));

    runner.execute().await.expect("execute");

    assert_eq!(env.states(), vec!["start", "success"]);
    assert_eq!(env.sent_task_count(), 0);
    let execution = runner.execution().expect("execution");
    assert_eq!(execution.status(), ExecutionStatus::Terminated);
    assert!(execution.error().is_none());
    let started = execution.started_at().expect("started_at");
    let ended = execution.ended_at().expect("ended_at");
    assert!(started <= ended && ended <= Utc::now());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_task_successful_execution() {
    let env = TestEnvironment::new();
    let registry = FunctionRegistry::new();
    registry.register("tests.ops.success", |_, _| Ok(()));

    let runner = runner(&env, registry, |_, graph| {
        graph.add_tasks(op(&env, "tests.ops.success", TaskOptions::default())?);
        Ok(())
    });
    runner.execute().await.expect("execute");

    assert_eq!(env.states(), vec!["start", "success"]);
    assert_eq!(env.sent_task_count(), 1);
    assert_eq!(
        runner.execution().unwrap().status(),
        ExecutionStatus::Terminated
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_task_failed_execution() {
    let env = TestEnvironment::new();
    let registry = FunctionRegistry::new();
    registry.register("tests.ops.failure", |_, _| Err("operation failed".into()));

    let runner = runner(&env, registry, |_, graph| {
        graph.add_tasks(op(&env, "tests.ops.failure", TaskOptions::default())?);
        Ok(())
    });
    let result = runner.execute().await;

    assert!(matches!(
        result,
        Err(engine::Error::ExecutorException { .. })
    ));
    assert_eq!(env.states(), vec!["start", "failure"]);
    assert_eq!(env.sent_task_count(), 1);
    let execution = runner.execution().expect("execution");
    assert_eq!(execution.status(), ExecutionStatus::Failed);
    assert!(execution.error().is_some());
    let started = execution.started_at().expect("started_at");
    let ended = execution.ended_at().expect("ended_at");
    assert!(started <= ended && ended <= Utc::now());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_tasks_execute_in_dependency_order() {
    let env = TestEnvironment::new();
    let invocations: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

    let registry = FunctionRegistry::new();
    let sink = Arc::clone(&invocations);
    registry.register("tests.ops.ordered", move |_, inputs| {
        let counter = inputs
            .get("counter")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        sink.lock().unwrap().push(counter);
        Ok(())
    });

    let runner = runner(&env, registry, |_, graph| {
        let op1 = op(
            &env,
            "tests.ops.ordered",
            TaskOptions {
                inputs: Some([("counter".to_string(), json!(1))].into_iter().collect()),
                ..TaskOptions::default()
            },
        )?;
        let op2 = op(
            &env,
            "tests.ops.ordered",
            TaskOptions {
                inputs: Some([("counter".to_string(), json!(2))].into_iter().collect()),
                ..TaskOptions::default()
            },
        )?;
        graph.sequence(vec![op1, op2])?;
        Ok(())
    });
    runner.execute().await.expect("execute");

    assert_eq!(env.states(), vec!["start", "success"]);
    assert_eq!(*invocations.lock().unwrap(), vec![1, 2]);
    assert_eq!(env.sent_task_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stub_and_sub_workflow_execution() {
    let env = TestEnvironment::new();
    let invocations: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

    let registry = FunctionRegistry::new();
    let sink = Arc::clone(&invocations);
    registry.register("tests.ops.ordered", move |_, inputs| {
        let counter = inputs
            .get("counter")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        sink.lock().unwrap().push(counter);
        Ok(())
    });

    let runner = runner(&env, registry, |_, graph| {
        let sub_workflow = Task::workflow("sub_workflow", |_, sub_graph| {
            let op1 = op(
                &env,
                "tests.ops.ordered",
                TaskOptions {
                    inputs: Some([("counter".to_string(), json!(1))].into_iter().collect()),
                    ..TaskOptions::default()
                },
            )?;
            let op2 = op(
                &env,
                "tests.ops.ordered",
                TaskOptions {
                    inputs: Some([("counter".to_string(), json!(2))].into_iter().collect()),
                    ..TaskOptions::default()
                },
            )?;
            sub_graph.sequence(vec![op1, Task::stub(), op2])?;
            Ok(())
        })?;
        graph.add_tasks(sub_workflow);
        Ok(())
    });
    runner.execute().await.expect("execute");

    assert_eq!(env.states(), vec!["start", "success"]);
    assert_eq!(*invocations.lock().unwrap(), vec![1, 2]);
    assert_eq!(env.sent_task_count(), 2);
}

/// Registers a function failing until `failure_count` prior
/// invocations were seen, recording invocation instants.
fn conditional_failure(
    registry: &FunctionRegistry,
    invocations: &Arc<Mutex<Vec<Instant>>>,
) {
    let sink = Arc::clone(invocations);
    registry.register("tests.ops.conditional_failure", move |_, inputs| {
        let failure_count = inputs
            .get("failure_count")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize;
        let mut invocations = sink.lock().unwrap();
        let fail = invocations.len() < failure_count;
        invocations.push(Instant::now());
        if fail {
            Err("induced failure".into())
        } else {
            Ok(())
        }
    });
}

fn conditional_failure_options(failure_count: u64, max_attempts: i32) -> TaskOptions {
    TaskOptions {
        max_attempts: Some(max_attempts),
        inputs: Some(
            [("failure_count".to_string(), json!(failure_count))]
                .into_iter()
                .collect(),
        ),
        ..TaskOptions::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_max_attempts_and_success_on_retry() {
    let env = TestEnvironment::new();
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let registry = FunctionRegistry::new();
    conditional_failure(&registry, &invocations);

    let runner = runner(&env, registry, |_, graph| {
        graph.add_tasks(op(
            &env,
            "tests.ops.conditional_failure",
            conditional_failure_options(1, 2),
        )?);
        Ok(())
    });
    runner.execute().await.expect("execute");

    assert_eq!(env.states(), vec!["start", "success"]);
    assert_eq!(invocations.lock().unwrap().len(), 2);
    assert_eq!(env.sent_task_count(), 2);

    let records = runner.workflow_context().model().task.list().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attempts_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_max_attempts_and_failure_on_retry() {
    let env = TestEnvironment::new();
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let registry = FunctionRegistry::new();
    conditional_failure(&registry, &invocations);

    let runner = runner(&env, registry, |_, graph| {
        graph.add_tasks(op(
            &env,
            "tests.ops.conditional_failure",
            conditional_failure_options(2, 2),
        )?);
        Ok(())
    });
    let result = runner.execute().await;

    assert!(matches!(
        result,
        Err(engine::Error::ExecutorException { .. })
    ));
    assert_eq!(env.states(), vec!["start", "failure"]);
    assert_eq!(invocations.lock().unwrap().len(), 2);
    assert_eq!(env.sent_task_count(), 2);
    assert_eq!(
        runner.execution().unwrap().status(),
        ExecutionStatus::Failed
    );

    let records = runner.workflow_context().model().task.list().unwrap();
    assert_eq!(records[0].attempts_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_max_attempts_and_success_on_second_retry() {
    let env = TestEnvironment::new();
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let registry = FunctionRegistry::new();
    conditional_failure(&registry, &invocations);

    let runner = runner(&env, registry, |_, graph| {
        graph.add_tasks(op(
            &env,
            "tests.ops.conditional_failure",
            conditional_failure_options(2, 3),
        )?);
        Ok(())
    });
    runner.execute().await.expect("execute");

    assert_eq!(env.states(), vec!["start", "success"]);
    assert_eq!(invocations.lock().unwrap().len(), 3);
    assert_eq!(env.sent_task_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn infinite_retries() {
    let env = TestEnvironment::new();
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let registry = FunctionRegistry::new();
    conditional_failure(&registry, &invocations);

    let runner = runner(&env, registry, |_, graph| {
        graph.add_tasks(op(
            &env,
            "tests.ops.conditional_failure",
            conditional_failure_options(1, -1),
        )?);
        Ok(())
    });
    runner.execute().await.expect("execute");

    assert_eq!(env.states(), vec!["start", "success"]);
    assert_eq!(invocations.lock().unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn retry_interval_is_respected() {
    let env = TestEnvironment::new();
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let registry = FunctionRegistry::new();
    conditional_failure(&registry, &invocations);

    let retry_interval = Duration::from_millis(300);
    let runner = runner(&env, registry, |_, graph| {
        graph.add_tasks(op(
            &env,
            "tests.ops.conditional_failure",
            TaskOptions {
                retry_interval: Some(retry_interval),
                ..conditional_failure_options(1, 2)
            },
        )?);
        Ok(())
    });
    runner.execute().await.expect("execute");

    assert_eq!(env.states(), vec!["start", "success"]);
    let invocations = invocations.lock().unwrap();
    assert_eq!(invocations.len(), 2);
    assert!(invocations[1] - invocations[0] >= retry_interval);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ignore_failure_does_not_fail_the_workflow() {
    let env = TestEnvironment::new();
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let registry = FunctionRegistry::new();
    conditional_failure(&registry, &invocations);

    let runner = runner(&env, registry, |_, graph| {
        graph.add_tasks(op(
            &env,
            "tests.ops.conditional_failure",
            TaskOptions {
                ignore_failure: Some(true),
                ..conditional_failure_options(100, 100)
            },
        )?);
        Ok(())
    });
    runner.execute().await.expect("execute");

    assert_eq!(env.states(), vec!["start", "success"]);
    // Treated as success immediately: no retries happen at all.
    assert_eq!(invocations.lock().unwrap().len(), 1);
    assert_eq!(env.sent_task_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_started_execution() {
    let env = TestEnvironment::new();
    let invocations: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let number_of_tasks = 100;

    let registry = FunctionRegistry::new();
    let sink = Arc::clone(&invocations);
    registry.register("tests.ops.sleep", move |_, inputs| {
        let millis = inputs
            .get("millis")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        sink.lock().unwrap().push(Instant::now());
        std::thread::sleep(Duration::from_millis(millis));
        Ok(())
    });

    let runner = runner(&env, registry, |_, graph| {
        let mut tasks = Vec::new();
        for _ in 0..number_of_tasks {
            tasks.push(op(
                &env,
                "tests.ops.sleep",
                TaskOptions {
                    inputs: Some([("millis".to_string(), json!(100))].into_iter().collect()),
                    ..TaskOptions::default()
                },
            )?);
        }
        graph.sequence(tasks)?;
        Ok(())
    });

    let engine = runner.engine();
    let execution_task = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.execute().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    engine.cancel_execution();
    execution_task
        .await
        .expect("join")
        .expect("cancelled execution is not an error");

    assert_eq!(env.states(), vec!["start", "cancel"]);
    let invoked = invocations.lock().unwrap().len();
    assert!(invoked > 0 && invoked < number_of_tasks);
    let execution = runner.execution().expect("execution");
    assert_eq!(execution.status(), ExecutionStatus::Cancelled);
    assert!(execution.error().is_none());
    let started = execution.started_at().expect("started_at");
    let ended = execution.ended_at().expect("ended_at");
    assert!(started <= ended && ended <= Utc::now());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_pending_execution() {
    let env = TestEnvironment::new();
    let runner = runner(&env, FunctionRegistry::new(), |_, graph| {
        graph.add_tasks(op(&env, "tests.ops.never_runs", TaskOptions::default())?);
        Ok(())
    });

    runner.cancel();

    let execution = runner.execution().expect("execution");
    assert_eq!(execution.status(), ExecutionStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_signal_precedes_any_sent_task() {
    let env = TestEnvironment::new();
    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&order);
    env.hub.subscribe_all(move |event| {
        sink.lock().unwrap().push(event.signal().name().to_string());
    });

    let registry = FunctionRegistry::new();
    registry.register("tests.ops.success", |_, _| Ok(()));
    let runner = runner(&env, registry, |_, graph| {
        graph.add_tasks(op(&env, "tests.ops.success", TaskOptions::default())?);
        Ok(())
    });
    runner.execute().await.expect("execute");

    let order = order.lock().unwrap();
    let start_position = order.iter().position(|name| name == "start_workflow");
    let first_sent = order.iter().position(|name| name == "sent_task");
    assert_eq!(order.iter().filter(|name| *name == "start_workflow").count(), 1);
    assert!(start_position.unwrap() < first_sent.unwrap());
}
