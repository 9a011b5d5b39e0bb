//! Supervised dispatch pool for asynchronous delivery hand-off.
//!
//! The dispatcher enqueues delivery IDs here instead of firing and
//! forgetting: a fixed set of supervised tasks drains the queue and runs
//! each attempt through the worker, whose outcome always lands on the
//! delivery row. Shutdown is cooperative and idempotent.

use std::sync::Arc;

use skiff_core::models::DeliveryId;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::worker::DeliveryWorker;

/// Pool of supervised tasks executing delivery attempts.
pub struct DeliveryPool {
    tx: mpsc::Sender<DeliveryId>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl DeliveryPool {
    /// Spawns `worker_count` tasks draining a queue of `queue_capacity`.
    pub fn spawn(worker: Arc<DeliveryWorker>, worker_count: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let mut handles = Vec::with_capacity(worker_count);
        for task_id in 0..worker_count {
            let rx = rx.clone();
            let cancel = cancel.clone();
            let worker = worker.clone();

            handles.push(tokio::spawn(async move {
                debug!(task_id, "dispatch pool task starting");

                loop {
                    // The receiver lock is held only while waiting for the
                    // next ID, never across an attempt.
                    let delivery_id = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            maybe_id = rx.recv() => match maybe_id {
                                Some(id) => id,
                                None => break,
                            },
                            () = cancel.cancelled() => break,
                        }
                    };

                    worker.attempt_delivery(delivery_id).await;
                }

                debug!(task_id, "dispatch pool task stopped");
            }));
        }

        info!(worker_count, queue_capacity, "dispatch pool started");

        Self { tx, handles: Mutex::new(handles), cancel }
    }

    /// Enqueues a delivery for asynchronous attempt.
    ///
    /// Only fails once the pool is shut down; the refusal is logged, not
    /// surfaced, matching the producer-side isolation contract.
    pub async fn submit(&self, delivery_id: DeliveryId) {
        if self.tx.send(delivery_id).await.is_err() {
            warn!(%delivery_id, "dispatch pool is shut down, dropping hand-off");
        }
    }

    /// Signals shutdown and waits for in-flight attempts to finish.
    ///
    /// Idempotent: later calls find no handles and return immediately.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let handles = std::mem::take(&mut *self.handles.lock().await);
        if handles.is_empty() {
            return;
        }

        for handle in handles {
            if let Err(join_error) = handle.await {
                warn!(error = %join_error, "dispatch pool task panicked during shutdown");
            }
        }

        info!("dispatch pool shut down");
    }

    /// Whether any pool task is still running.
    pub async fn has_active_tasks(&self) -> bool {
        self.handles.lock().await.iter().any(|h| !h.is_finished())
    }
}

impl Drop for DeliveryPool {
    fn drop(&mut self) {
        // Backstop: a pool dropped without shutdown must not leak tasks.
        self.cancel.cancel();
    }
}
