//! Blocking client side of the ctx proxy, used by child processes.

use std::time::Duration;

use serde_json::Value;

use super::{Error, ProxyRequest, ProxyResponse, Result};

/// Send one ctx call and unwrap the response envelope.
///
/// Blocking by design: this runs inside operation child processes, not
/// on the engine runtime.
pub fn request(socket_url: &str, args: Vec<Value>, timeout: Duration) -> Result<Value> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Request {
            message: e.to_string(),
        })?;

    let response = client
        .post(socket_url)
        .json(&ProxyRequest { args })
        .send()
        .map_err(|e| Error::Request {
            message: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(Error::Request {
            message: format!("request failed with status {}", response.status()),
        });
    }

    let response: ProxyResponse = response.json().map_err(|e| Error::Request {
        message: e.to_string(),
    })?;

    match response.kind.as_str() {
        "error" => {
            let field = |name: &str| {
                response
                    .payload
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            Err(Error::Remote {
                kind: field("type"),
                message: field("message"),
                traceback: field("traceback"),
            })
        }
        "stop_operation" => Err(Error::StopOperation {
            message: response
                .payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        _ => Ok(response.payload),
    }
}

/// Turn CLI arguments into JSON operands: arguments starting with the
/// json prefix are parsed, everything else stays a string.
pub fn process_args(json_prefix: &str, args: &[String]) -> Result<Vec<Value>> {
    args.iter()
        .map(|arg| {
            if let Some(stripped) = arg.strip_prefix(json_prefix) {
                serde_json::from_str(stripped).map_err(|e| Error::Request {
                    message: format!("invalid JSON argument {arg:?}: {e}"),
                })
            } else {
                Ok(Value::String(arg.clone()))
            }
        })
        .collect()
}
