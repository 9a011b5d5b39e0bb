//! The delivery worker: one attempt of one delivery, fully classified.
//!
//! The worker is the single writer of a delivery's status, attempt
//! counter, and retry time. Every failure mode ends up persisted on the
//! delivery row; nothing escapes the worker's boundary.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bytes::Bytes;
use skiff_core::{
    models::{Delivery, DeliveryId},
    Clock,
};
use tracing::{error, info, warn};

use crate::{
    client::{DeliveryClient, DeliveryRequest},
    retry::{decide_retry, RetryDecision},
    signature::sign_payload,
    store::DeliveryStore,
};

/// Counters for delivery monitoring, shared across worker handles.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    /// Deliveries created by the dispatcher.
    pub dispatched: AtomicU64,
    /// Attempts that ended in `delivered`.
    pub delivered: AtomicU64,
    /// Attempts that scheduled a retry.
    pub retried: AtomicU64,
    /// Attempts that ended in terminal `failed`.
    pub failed: AtomicU64,
}

impl DeliveryStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time view of the counters.
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.dispatched.load(Ordering::Relaxed),
            self.delivered.load(Ordering::Relaxed),
            self.retried.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }
}

/// Executes single delivery attempts and persists their outcome.
pub struct DeliveryWorker {
    store: Arc<dyn DeliveryStore>,
    client: Arc<DeliveryClient>,
    clock: Arc<dyn Clock>,
    stats: Arc<DeliveryStats>,
}

impl DeliveryWorker {
    /// Creates a new worker.
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        client: Arc<DeliveryClient>,
        clock: Arc<dyn Clock>,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        Self { store, client, clock, stats }
    }

    /// Performs one delivery attempt.
    ///
    /// Returns whether the delivery reached `delivered`. Never returns an
    /// error: network failures, target errors, and persistence failures
    /// are all captured into the delivery row (or logged when even that
    /// fails).
    pub async fn attempt_delivery(&self, delivery_id: DeliveryId) -> bool {
        let delivery = match self.store.find_delivery(delivery_id).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => {
                warn!(%delivery_id, "delivery row not found, skipping attempt");
                return false;
            },
            Err(db_error) => {
                error!(%delivery_id, error = %db_error, "failed to load delivery");
                return false;
            },
        };

        // Terminal rows are never resurrected, whatever hands them in.
        if delivery.status.is_terminal() {
            warn!(
                %delivery_id,
                status = %delivery.status,
                "refusing attempt on terminal delivery"
            );
            return false;
        }

        let webhook = match self.store.find_webhook(delivery.webhook_id).await {
            Ok(webhook) => webhook,
            Err(db_error) => {
                error!(%delivery_id, error = %db_error, "failed to load webhook");
                return false;
            },
        };

        let Some(webhook) = webhook else {
            // Webhook deleted since dispatch: permanent failure.
            self.fail_permanently(
                &delivery,
                delivery.attempts,
                None,
                None,
                "webhook no longer exists",
            )
            .await;
            return false;
        };

        let signature = match sign_payload(&webhook.secret, delivery.payload.as_bytes()) {
            Ok(signature) => signature,
            Err(sig_error) => {
                self.fail_permanently(
                    &delivery,
                    delivery.attempts,
                    None,
                    None,
                    &sig_error.to_string(),
                )
                .await;
                return false;
            },
        };

        let attempt = delivery.attempts + 1;

        let request = DeliveryRequest {
            delivery_id,
            event_type: delivery.event_type.clone(),
            url: webhook.url.clone(),
            payload: Bytes::from(delivery.payload.clone().into_bytes()),
            signature,
        };

        match self.client.deliver(request).await {
            Ok(response) if response.is_success => {
                let delivered_at = self.clock.now_utc();
                if let Err(db_error) = self
                    .store
                    .mark_delivered(
                        delivery_id,
                        attempt,
                        i32::from(response.status_code),
                        &response.body,
                        delivered_at,
                    )
                    .await
                {
                    error!(%delivery_id, error = %db_error, "failed to persist delivered state");
                    return false;
                }

                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                info!(
                    %delivery_id,
                    webhook_id = %webhook.id,
                    status = response.status_code,
                    attempt,
                    "webhook delivered"
                );
                true
            },
            Ok(response) => {
                let detail = format!("HTTP {} response from target", response.status_code);
                self.handle_failure(
                    &delivery,
                    attempt,
                    Some(i32::from(response.status_code)),
                    Some(response.body.as_str()),
                    &detail,
                )
                .await;
                false
            },
            Err(net_error) => {
                self.handle_failure(
                    &delivery,
                    attempt,
                    net_error.response_status(),
                    None,
                    &net_error.to_string(),
                )
                .await;
                false
            },
        }
    }

    /// Routes a failed attempt to retry scheduling or terminal failure.
    async fn handle_failure(
        &self,
        delivery: &Delivery,
        attempt: i32,
        response_status: Option<i32>,
        response_body: Option<&str>,
        detail: &str,
    ) {
        let max_attempts = u32::try_from(delivery.max_attempts).unwrap_or(0);
        let now = self.clock.now_utc();

        match decide_retry(u32::try_from(attempt).unwrap_or(u32::MAX), max_attempts, now) {
            RetryDecision::Retry { next_attempt_at } => {
                if let Err(db_error) = self
                    .store
                    .schedule_retry(
                        delivery.id,
                        attempt,
                        next_attempt_at,
                        response_status,
                        response_body,
                        detail,
                    )
                    .await
                {
                    error!(
                        delivery_id = %delivery.id,
                        error = %db_error,
                        "failed to persist retry schedule"
                    );
                    return;
                }

                self.stats.retried.fetch_add(1, Ordering::Relaxed);
                warn!(
                    delivery_id = %delivery.id,
                    attempt,
                    next_retry_at = %next_attempt_at,
                    detail,
                    "delivery failed, retry scheduled"
                );
            },
            RetryDecision::GiveUp => {
                self.fail_permanently(delivery, attempt, response_status, response_body, detail)
                    .await;
            },
        }
    }

    /// Persists a terminal failure.
    async fn fail_permanently(
        &self,
        delivery: &Delivery,
        attempts: i32,
        response_status: Option<i32>,
        response_body: Option<&str>,
        detail: &str,
    ) {
        if let Err(db_error) = self
            .store
            .mark_failed(delivery.id, attempts, response_status, response_body, detail)
            .await
        {
            error!(
                delivery_id = %delivery.id,
                error = %db_error,
                "failed to persist failed state"
            );
            return;
        }

        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        error!(
            delivery_id = %delivery.id,
            webhook_id = %delivery.webhook_id,
            attempts,
            detail,
            "delivery permanently failed"
        );
    }
}
