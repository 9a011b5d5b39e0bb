//! Periodic retry sweep.
//!
//! Independently of dispatch, the sweeper scans for deliveries stuck in
//! `retrying` whose retry time has elapsed and re-submits each through
//! the worker. The scan is bounded per tick to cap sweep latency, and a
//! single delivery's failure never aborts the rest of the sweep.

use std::sync::Arc;

use skiff_core::Clock;
use tracing::{debug, error};

use crate::{store::DeliveryStore, worker::DeliveryWorker, SWEEP_BATCH_SIZE};

/// Re-submits due deliveries to the worker.
pub struct RetrySweeper {
    store: Arc<dyn DeliveryStore>,
    worker: Arc<DeliveryWorker>,
    clock: Arc<dyn Clock>,
}

impl RetrySweeper {
    /// Creates a new sweeper.
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        worker: Arc<DeliveryWorker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, worker, clock }
    }

    /// Runs one sweep tick. Returns how many deliveries were re-submitted.
    pub async fn sweep(&self) -> usize {
        let due = match self.store.due_retries(self.clock.now_utc(), SWEEP_BATCH_SIZE).await {
            Ok(due) => due,
            Err(db_error) => {
                error!(error = %db_error, "retry sweep failed to query due deliveries");
                return 0;
            },
        };

        if due.is_empty() {
            return 0;
        }

        debug!(due = due.len(), "re-submitting due deliveries");

        let mut resubmitted = 0;
        for delivery_id in due {
            // attempt_delivery captures its own failures; the sweep just
            // moves on to the next delivery.
            self.worker.attempt_delivery(delivery_id).await;
            resubmitted += 1;
        }

        resubmitted
    }
}
