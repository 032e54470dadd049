//! Subprocess task executor.
//!
//! Runs each operation as a child process: the implementation path is
//! the command, the bound arguments travel as a JSON argv entry, and a
//! per-task ctx proxy gives the child transactional access to the
//! parent's operation context through the `ctx` CLI.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::ctx_proxy::{CTX_SOCKET_URL, CtxProxyServer};

use super::{Error, Executor, Result, TaskHandle};

/// Environment variable carrying the serialized operation context.
pub const OPERATION_CONTEXT_ENV: &str = "WEAVER_OPERATION_CONTEXT";

pub struct SubprocessExecutor {
    /// Hard per-attempt wall-clock ceiling; the child is killed on
    /// expiry. `None` waits indefinitely.
    timeout: Option<Duration>,
    running: Arc<Mutex<Vec<JoinHandle<()>>>>,
    closed: Arc<AtomicBool>,
}

impl SubprocessExecutor {
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            running: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for SubprocessExecutor {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Executor for SubprocessExecutor {
    async fn submit(&self, task: TaskHandle) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        let timeout = self.timeout;
        let worker = tokio::spawn(async move {
            run_task(task, timeout).await;
        });
        let mut running = self.running.lock().await;
        running.retain(|handle| !handle.is_finished());
        running.push(worker);
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handles: Vec<JoinHandle<()>> = {
            let mut running = self.running.lock().await;
            running.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn run_task(task: TaskHandle, timeout: Option<Duration>) {
    task.started();
    match spawn_and_wait(&task, timeout).await {
        Ok(()) => task.succeeded(),
        Err((error, traceback)) => task.failed(error, traceback),
    }
}

async fn spawn_and_wait(
    task: &TaskHandle,
    timeout: Option<Duration>,
) -> std::result::Result<(), (String, String)> {
    let ctx = task.ctx().clone();
    let record = ctx.task().map_err(|e| (e.to_string(), String::new()))?;

    let arguments = serde_json::to_string(&record.arguments)
        .map_err(|e| (e.to_string(), String::new()))?;
    let serialized_ctx = serde_json::to_string(&ctx.serialized())
        .map_err(|e| (e.to_string(), String::new()))?;

    let proxy = CtxProxyServer::start(ctx.clone())
        .await
        .map_err(|e| (e.to_string(), String::new()))?;

    let child = Command::new(&record.function)
        .arg(&arguments)
        .env(CTX_SOCKET_URL, proxy.url())
        .env(OPERATION_CONTEXT_ENV, &serialized_ctx)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            proxy.close().await;
            return Err((
                format!("failed to spawn {}: {e}", record.function),
                String::new(),
            ));
        }
    };

    let output = match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output,
            Err(_) => {
                // wait_with_output consumed the child; kill_on_drop
                // reaps it when the future is dropped by the timeout.
                proxy.close().await;
                return Err((
                    format!("operation timed out after {}s", timeout.as_secs_f64()),
                    String::new(),
                ));
            }
        },
        None => child.wait_with_output().await,
    };
    proxy.close().await;

    let output = output.map_err(|e| (e.to_string(), String::new()))?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        Err((
            format!("operation exited with {}", output.status),
            stderr,
        ))
    }
}
