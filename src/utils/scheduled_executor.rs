//! Periodic task runner for background sweeps
//!
//! Used by the effectiveness-monitoring sweep and the approval expiry
//! sweep. The advisor core stays synchronous per call; anything periodic
//! goes through this executor so the embedding orchestrator controls
//! task lifetime.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A task executed on a fixed interval.
pub trait ScheduledTask: Send + Sync + 'static {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>>;

    /// When true the executor loop exits after the current tick.
    fn should_terminate(&self) -> bool {
        false
    }
}

impl<T: ScheduledTask> ScheduledTask for Arc<T> {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        (**self).run()
    }

    fn should_terminate(&self) -> bool {
        (**self).should_terminate()
    }
}

/// Handle for stopping a running executor from outside the loop.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

/// Runs a [`ScheduledTask`] on a fixed interval until shut down.
pub struct ScheduledExecutor {
    task_name: String,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl ScheduledExecutor {
    pub fn new(task_name: impl Into<String>, interval: Duration) -> Self {
        Self {
            task_name: task_name.into(),
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { flag: self.shutdown.clone() }
    }

    /// Drive the task until shutdown or `should_terminate()`.
    ///
    /// Task failures are logged and the loop continues; a failing sweep
    /// must not kill the schedule.
    pub async fn start<T: ScheduledTask>(self, task: T) {
        tracing::info!(
            "starting scheduled task '{}' every {:?}",
            self.task_name,
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // tokio's first tick fires immediately; skip it so the task runs
        // one full interval after startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if self.shutdown.load(Ordering::Relaxed) || task.should_terminate() {
                break;
            }

            if let Err(e) = task.run().await {
                tracing::error!("scheduled task '{}' failed: {}", self.task_name, e);
            } else {
                tracing::debug!("scheduled task '{}' completed", self.task_name);
            }
        }

        tracing::info!("scheduled task '{}' stopped", self.task_name);
    }
}
