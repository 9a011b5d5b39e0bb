//! The scheduler: supervised periodic tasks and lifecycle management.
//!
//! Each registered task runs on its own timer; callbacks are wrapped so
//! an error is logged and the task keeps firing on its original
//! schedule. Shutdown cancels future ticks and the event listener but
//! lets in-flight work run to completion, and calling it twice is safe.

use std::{future::Future, sync::Arc, time::Duration};

use skiff_core::EventBus;
use skiff_delivery::{DeliveryPool, Dispatcher};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct TaskHandle {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Owns every periodic task and long-lived subscription.
pub struct Scheduler {
    cancel: CancellationToken,
    tasks: Vec<TaskHandle>,
    subscriptions: Vec<JoinHandle<()>>,
    pool: Option<Arc<DeliveryPool>>,
    shut_down: bool,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            subscriptions: Vec::new(),
            pool: None,
            shut_down: false,
        }
    }

    /// Registers a periodic task.
    ///
    /// The first tick fires after one full interval; missed ticks are
    /// skipped rather than bursted (best-effort scheduling). A callback
    /// error is logged and never stops the timer.
    pub fn register<F, Fut>(&mut self, name: &'static str, interval: Duration, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(task_error) = callback().await {
                            error!(task = name, error = %task_error, "scheduled task failed");
                        }
                    }
                    () = cancel.cancelled() => break,
                }
            }

            debug!(task = name, "periodic task stopped");
        });

        info!(task = name, interval_secs = interval.as_secs(), "periodic task registered");
        self.tasks.push(TaskHandle { name, handle });
    }

    /// Starts the event-bus listener that feeds the dispatcher.
    ///
    /// The subscription lives until shutdown; lagged events are dropped
    /// with a warning rather than stalling producers.
    pub fn attach_listener(&mut self, bus: &EventBus, dispatcher: Arc<Dispatcher>) {
        let mut rx = bus.subscribe();
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Ok(event) => dispatcher.dispatch(&event).await,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "event listener lagged, events dropped");
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    () = cancel.cancelled() => break,
                }
            }

            debug!("event listener stopped");
        });

        self.subscriptions.push(handle);
    }

    /// Hands the dispatch pool to the scheduler for shutdown ownership.
    pub fn attach_pool(&mut self, pool: Arc<DeliveryPool>) {
        self.pool = Some(pool);
    }

    /// Number of task and subscription handles still running.
    pub fn active_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| !t.handle.is_finished()).count()
            + self.subscriptions.iter().filter(|h| !h.is_finished()).count()
    }

    /// Stops every timer, the event listener, and the dispatch pool.
    ///
    /// Idempotent: a second call finds nothing to stop and returns
    /// immediately. In-flight task bodies run to completion; only future
    /// ticks are cancelled.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            debug!("scheduler already shut down");
            return;
        }
        self.shut_down = true;

        info!("shutting down scheduler");
        self.cancel.cancel();

        for task in self.tasks.drain(..) {
            if let Err(join_error) = task.handle.await {
                warn!(task = task.name, error = %join_error, "task panicked during shutdown");
            }
        }

        for subscription in self.subscriptions.drain(..) {
            if let Err(join_error) = subscription.await {
                warn!(error = %join_error, "subscription panicked during shutdown");
            }
        }

        if let Some(pool) = self.pool.take() {
            pool.shutdown().await;
        }

        info!("scheduler shut down");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Backstop: a scheduler dropped without shutdown must not leak
        // its timers.
        self.cancel.cancel();
    }
}
