//! Thread-pool task executor.
//!
//! The reference executor: worker slots bounded by a semaphore, each
//! task running its registry function on a blocking thread. Easier to
//! test against than the subprocess executor, and sufficient whenever
//! operations are plain in-process functions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

use super::{Error, Executor, FunctionRegistry, Result, TaskHandle};

pub struct ThreadExecutor {
    registry: FunctionRegistry,
    slots: Arc<Semaphore>,
    running: Arc<Mutex<Vec<JoinHandle<()>>>>,
    closed: Arc<AtomicBool>,
}

impl ThreadExecutor {
    #[must_use]
    pub fn new(registry: FunctionRegistry, pool_size: usize) -> Self {
        Self {
            registry,
            slots: Arc::new(Semaphore::new(pool_size.max(1))),
            running: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Executor for ThreadExecutor {
    async fn submit(&self, task: TaskHandle) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        let registry = self.registry.clone();
        let slots = Arc::clone(&self.slots);
        let worker = tokio::spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                // Semaphore closed: executor shut down before this task
                // got a slot.
                task.failed("executor closed".to_string(), String::new());
                return;
            };
            run_task(registry, task).await;
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

async fn run_task(registry: FunctionRegistry, task: TaskHandle) {
    task.started();

    let ctx = task.ctx().clone();
    let record = match ctx.task() {
        Ok(record) => record,
        Err(e) => {
            task.failed(e.to_string(), String::new());
            return;
        }
    };
    let Some(function) = registry.get(&record.function) else {
        task.failed(
            format!("no such operation function: {}", record.function),
            String::new(),
        );
        return;
    };

    let arguments = record.arguments.clone();
    let outcome =
        tokio::task::spawn_blocking(move || function(&ctx, &arguments)).await;

    match outcome {
        Ok(Ok(())) => task.succeeded(),
        Ok(Err(error)) => {
            let traceback = format!("{error:?}");
            task.failed(error.to_string(), traceback);
        }
        Err(join_error) => {
            // Operation panicked; the payload text stands in for a
            // traceback.
            let traceback = join_error.to_string();
            let error = if join_error.is_panic() {
                match join_error.into_panic().downcast::<String>() {
                    Ok(message) => *message,
                    Err(payload) => match payload.downcast::<&'static str>() {
                        Ok(message) => (*message).to_string(),
                        Err(_) => "operation panicked".to_string(),
                    },
                }
            } else {
                "operation was aborted".to_string()
            };
            task.failed(error, traceback);
        }
    }
}
