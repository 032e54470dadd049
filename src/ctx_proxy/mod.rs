//! Subprocess ↔ parent context proxy.
//!
//! A child process spawned by the subprocess executor talks back to the
//! parent's operation context over a tiny local HTTP loop. The whole
//! wire contract: `POST /` with `{"args": [...]}`, answered by
//! `{"type": "ok"|"error"|"stop_operation", "payload": ...}`.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub mod client;
pub mod server;

pub use server::CtxProxyServer;

/// Environment variable the socket url is advertised through.
pub const CTX_SOCKET_URL: &str = "CTX_SOCKET_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub args: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
}

impl ProxyResponse {
    #[must_use]
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            kind: "ok".to_string(),
            payload,
        }
    }

    #[must_use]
    pub fn error(kind: &str, message: &str, traceback: &str) -> Self {
        Self {
            kind: "error".to_string(),
            payload: serde_json::json!({
                "type": kind,
                "message": message,
                "traceback": traceback,
            }),
        }
    }

    #[must_use]
    pub fn stop_operation(message: &str) -> Self {
        Self {
            kind: "stop_operation".to_string(),
            payload: serde_json::json!({ "message": message }),
        }
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Proxy request failed: {message}"))]
    Request { message: String },

    #[snafu(display("{kind}: {message}"))]
    Remote {
        kind: String,
        message: String,
        traceback: String,
    },

    #[snafu(display("Operation stopped: {message}"))]
    StopOperation { message: String },

    #[snafu(display("Failed to bind proxy socket: {source}"))]
    Bind { source: std::io::Error },

    #[snafu(display(
        "Missing {CTX_SOCKET_URL} environment variable or socket-url argument \
         (ctx is supposed to be executed within an operation context)"
    ))]
    MissingSocketUrl,
}

pub type Result<T> = std::result::Result<T, Error>;
