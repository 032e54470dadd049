//! Ctx proxy round-trips: a blocking client (as a child process would
//! use) against the per-task server.

mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use serde_json::{Value, json};
use weaver::context::OperationContext;
use weaver::ctx_proxy::{self, CtxProxyServer, client};
use weaver::model::Actor;

use common::{DEPENDENCY_NODE_ID, SERVICE_INSTANCE_ID, TestEnvironment};

fn operation_context(env: &TestEnvironment) -> OperationContext {
    OperationContext::new(
        "test_operation",
        "task-1",
        Actor::Node {
            id: DEPENDENCY_NODE_ID.to_string(),
        },
        "execution-1",
        SERVICE_INSTANCE_ID,
        env.model.clone(),
        env.resource.clone(),
        std::env::temp_dir().join("weaver-proxy-tests"),
        Arc::new(AtomicBool::new(false)),
    )
}

async fn call(url: &str, args: Vec<Value>) -> ctx_proxy::Result<Value> {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || client::request(&url, args, Duration::from_secs(5)))
        .await
        .expect("join")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn attribute_round_trip_through_the_proxy() {
    let env = TestEnvironment::new();
    let server = CtxProxyServer::start(operation_context(&env)).await.unwrap();
    let url = server.url().to_string();

    let set = call(
        &url,
        vec![
            json!("node"),
            json!("attributes"),
            json!("set"),
            json!("ip"),
            json!("10.0.0.1"),
        ],
    )
    .await
    .unwrap();
    assert_eq!(set, Value::Null);

    let get = call(
        &url,
        vec![json!("node"), json!("attributes"), json!("get"), json!("ip")],
    )
    .await
    .unwrap();
    assert_eq!(get, json!("10.0.0.1"));

    // The write went through the instrumented map into the store.
    let node = env.model.node.get(DEPENDENCY_NODE_ID).unwrap();
    assert_eq!(node.attributes.get("ip").unwrap().value, json!("10.0.0.1"));

    server.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_surfaces_as_stop_operation() {
    let env = TestEnvironment::new();
    let server = CtxProxyServer::start(operation_context(&env)).await.unwrap();
    let url = server.url().to_string();

    let result = call(&url, vec![json!("stop"), json!("enough")]).await;
    assert!(matches!(
        result,
        Err(ctx_proxy::Error::StopOperation { message }) if message == "enough"
    ));

    server.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_calls_are_remote_errors() {
    let env = TestEnvironment::new();
    let server = CtxProxyServer::start(operation_context(&env)).await.unwrap();
    let url = server.url().to_string();

    let result = call(&url, vec![json!("nonsense")]).await;
    assert!(matches!(result, Err(ctx_proxy::Error::Remote { .. })));

    server.close().await;
}

#[test]
fn json_prefixed_arguments_are_parsed() {
    let processed = client::process_args(
        "@",
        &[
            "node".to_string(),
            "@{\"nested\": [1, 2]}".to_string(),
            "plain".to_string(),
        ],
    )
    .unwrap();
    assert_eq!(processed[0], json!("node"));
    assert_eq!(processed[1], json!({"nested": [1, 2]}));
    assert_eq!(processed[2], json!("plain"));

    assert!(client::process_args("@", &["@not-json".to_string()]).is_err());
}
