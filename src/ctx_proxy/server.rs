use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use snafu::prelude::*;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::context::OperationContext;

use super::{BindSnafu, ProxyRequest, ProxyResponse, Result};

/// One proxy server per running subprocess task, bound to an ephemeral
/// local port for the lifetime of the attempt.
pub struct CtxProxyServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    serve: Option<JoinHandle<()>>,
}

impl CtxProxyServer {
    pub async fn start(ctx: OperationContext) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context(BindSnafu)?;
        let url = format!("http://{}", listener.local_addr().context(BindSnafu)?);

        let app = Router::new().route("/", post(handle)).with_state(ctx);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let serve = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                tracing::warn!(error = %e, "ctx proxy server error");
            }
        });

        Ok(Self {
            url,
            shutdown: Some(shutdown_tx),
            serve: Some(serve),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(serve) = self.serve.take() {
            let _ = serve.await;
        }
    }
}

impl Drop for CtxProxyServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn handle(
    State(ctx): State<OperationContext>,
    Json(request): Json<ProxyRequest>,
) -> Json<ProxyResponse> {
    Json(dispatch(&ctx, &request.args))
}

/// Walk the argument list into a context call. The first argument names
/// the subject, the rest are the path and operands.
fn dispatch(ctx: &OperationContext, args: &[Value]) -> ProxyResponse {
    let parts: Vec<&str> = args.iter().map(|arg| arg.as_str().unwrap_or("")).collect();
    match parts.split_first() {
        Some((&"node", rest)) => attributes_call(ctx, rest, args, false),
        Some((&"relationship", rest)) => attributes_call(ctx, rest, args, true),
        Some((&"task", _)) => match ctx.task() {
            Ok(record) => match serde_json::to_value(&record) {
                Ok(payload) => ProxyResponse::ok(payload),
                Err(e) => internal_error(&e),
            },
            Err(e) => internal_error(&e),
        },
        Some((&"stop", rest)) => {
            let message = rest.first().copied().unwrap_or("stopped by operation");
            ProxyResponse::stop_operation(message)
        }
        _ => ProxyResponse::error(
            "BadRequest",
            &format!("unknown ctx call: {args:?}"),
            "",
        ),
    }
}

fn attributes_call(
    ctx: &OperationContext,
    parts: &[&str],
    args: &[Value],
    relationship: bool,
) -> ProxyResponse {
    match parts {
        ["attributes", "get", key] => match get_attribute(ctx, relationship, key) {
            Ok(raw) => ProxyResponse::ok(raw),
            Err(e) => internal_error(&e),
        },
        ["attributes", "set", key, ..] => {
            // The value operand keeps its JSON type, so take it from the
            // raw args rather than the flattened strings.
            let Some(value) = args.get(4) else {
                return ProxyResponse::error("BadRequest", "missing value operand", "");
            };
            match set_attribute(ctx, relationship, key, value.clone()) {
                Ok(()) => ProxyResponse::ok(Value::Null),
                Err(e) => internal_error(&e),
            }
        }
        _ => ProxyResponse::error(
            "BadRequest",
            &format!("unknown attribute call: {parts:?}"),
            "",
        ),
    }
}

fn get_attribute(
    ctx: &OperationContext,
    relationship: bool,
    key: &str,
) -> std::result::Result<Value, String> {
    if relationship {
        let map = ctx.relationship_attributes().map_err(|e| e.to_string())?;
        match map.get(key).map_err(|e| e.to_string())? {
            Some(value) => value.raw().map_err(|e| e.to_string()),
            None => Ok(Value::Null),
        }
    } else {
        let map = ctx.node_attributes().map_err(|e| e.to_string())?;
        match map.get(key).map_err(|e| e.to_string())? {
            Some(value) => value.raw().map_err(|e| e.to_string()),
            None => Ok(Value::Null),
        }
    }
}

fn set_attribute(
    ctx: &OperationContext,
    relationship: bool,
    key: &str,
    value: Value,
) -> std::result::Result<(), String> {
    if relationship {
        let map = ctx.relationship_attributes().map_err(|e| e.to_string())?;
        map.set(key, value).map_err(|e| e.to_string())
    } else {
        let map = ctx.node_attributes().map_err(|e| e.to_string())?;
        map.set(key, value).map_err(|e| e.to_string())
    }
}

fn internal_error(error: &dyn std::fmt::Display) -> ProxyResponse {
    ProxyResponse::error("RuntimeError", &error.to_string(), "")
}
