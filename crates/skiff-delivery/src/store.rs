//! Storage abstraction for the delivery engine.
//!
//! Trait-based access to webhook and delivery persistence so the worker,
//! dispatcher, and sweeper can be tested against an in-memory double.
//! Production uses [`PostgresDeliveryStore`] over the repository layer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skiff_core::{
    error::Result,
    models::{Delivery, DeliveryId, Webhook, WebhookId},
    storage::Storage,
};

/// Storage operations required by the delivery engine.
///
/// The worker is the only caller of the mutation methods for any given
/// delivery ID; the dispatcher only creates fresh rows and the sweeper
/// only reads due ones.
#[async_trait]
pub trait DeliveryStore: Send + Sync + 'static {
    /// Loads a delivery by ID.
    async fn find_delivery(&self, delivery_id: DeliveryId) -> Result<Option<Delivery>>;

    /// Loads a webhook by ID. The secret is read fresh on every attempt.
    async fn find_webhook(&self, webhook_id: WebhookId) -> Result<Option<Webhook>>;

    /// Snapshot of all enabled webhooks for one dispatch.
    async fn list_enabled_webhooks(&self) -> Result<Vec<Webhook>>;

    /// Inserts the delivery list for one dispatched event atomically.
    async fn create_deliveries(&self, deliveries: &[Delivery]) -> Result<()>;

    /// Marks a delivery as successfully delivered. Terminal.
    async fn mark_delivered(
        &self,
        delivery_id: DeliveryId,
        attempts: i32,
        response_status: i32,
        response_body: &str,
        delivered_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Schedules a failed delivery for another attempt.
    #[allow(clippy::too_many_arguments)]
    async fn schedule_retry(
        &self,
        delivery_id: DeliveryId,
        attempts: i32,
        next_retry_at: DateTime<Utc>,
        response_status: Option<i32>,
        response_body: Option<&str>,
        error: &str,
    ) -> Result<()>;

    /// Marks a delivery as permanently failed. Terminal.
    async fn mark_failed(
        &self,
        delivery_id: DeliveryId,
        attempts: i32,
        response_status: Option<i32>,
        response_body: Option<&str>,
        error: &str,
    ) -> Result<()>;

    /// Deliveries in `retrying` whose retry time has elapsed, oldest
    /// first, bounded by `limit`.
    async fn due_retries(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<DeliveryId>>;
}

/// Production store backed by the PostgreSQL repositories.
pub struct PostgresDeliveryStore {
    storage: Arc<Storage>,
}

impl PostgresDeliveryStore {
    /// Creates a new PostgreSQL store adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl DeliveryStore for PostgresDeliveryStore {
    async fn find_delivery(&self, delivery_id: DeliveryId) -> Result<Option<Delivery>> {
        self.storage.deliveries.find_by_id(delivery_id).await
    }

    async fn find_webhook(&self, webhook_id: WebhookId) -> Result<Option<Webhook>> {
        self.storage.webhooks.find_by_id(webhook_id).await
    }

    async fn list_enabled_webhooks(&self) -> Result<Vec<Webhook>> {
        self.storage.webhooks.list_enabled().await
    }

    async fn create_deliveries(&self, deliveries: &[Delivery]) -> Result<()> {
        self.storage.deliveries.create_batch(deliveries).await
    }

    async fn mark_delivered(
        &self,
        delivery_id: DeliveryId,
        attempts: i32,
        response_status: i32,
        response_body: &str,
        delivered_at: DateTime<Utc>,
    ) -> Result<()> {
        self.storage
            .deliveries
            .mark_delivered(delivery_id, attempts, response_status, response_body, delivered_at)
            .await
    }

    async fn schedule_retry(
        &self,
        delivery_id: DeliveryId,
        attempts: i32,
        next_retry_at: DateTime<Utc>,
        response_status: Option<i32>,
        response_body: Option<&str>,
        error: &str,
    ) -> Result<()> {
        self.storage
            .deliveries
            .schedule_retry(
                delivery_id,
                attempts,
                next_retry_at,
                response_status,
                response_body,
                error,
            )
            .await
    }

    async fn mark_failed(
        &self,
        delivery_id: DeliveryId,
        attempts: i32,
        response_status: Option<i32>,
        response_body: Option<&str>,
        error: &str,
    ) -> Result<()> {
        self.storage
            .deliveries
            .mark_failed(delivery_id, attempts, response_status, response_body, error)
            .await
    }

    async fn due_retries(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<DeliveryId>> {
        self.storage.deliveries.find_due_retries(now, limit).await
    }
}

pub mod mock {
    //! In-memory store for testing delivery logic without a database.

    use std::collections::HashMap;

    use skiff_core::{error::CoreError, models::DeliveryStatus};
    use tokio::sync::RwLock;

    use super::{
        async_trait, DateTime, Delivery, DeliveryId, DeliveryStore, Result, Utc, Webhook,
        WebhookId,
    };

    /// Mock store with injectable failures and verification helpers.
    #[derive(Default)]
    pub struct MockDeliveryStore {
        webhooks: RwLock<HashMap<WebhookId, Webhook>>,
        deliveries: RwLock<HashMap<DeliveryId, Delivery>>,
        list_error: RwLock<Option<String>>,
    }

    impl MockDeliveryStore {
        /// Creates an empty mock store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Adds a webhook.
        pub async fn add_webhook(&self, webhook: Webhook) {
            self.webhooks.write().await.insert(webhook.id, webhook);
        }

        /// Removes a webhook, simulating administrative deletion.
        pub async fn remove_webhook(&self, webhook_id: WebhookId) {
            self.webhooks.write().await.remove(&webhook_id);
        }

        /// Adds a delivery row directly.
        pub async fn add_delivery(&self, delivery: Delivery) {
            self.deliveries.write().await.insert(delivery.id, delivery);
        }

        /// Fails the next `list_enabled_webhooks` call.
        pub async fn inject_list_error(&self, error: impl Into<String>) {
            *self.list_error.write().await = Some(error.into());
        }

        /// Snapshot of a delivery row for assertions.
        pub async fn delivery(&self, delivery_id: DeliveryId) -> Option<Delivery> {
            self.deliveries.read().await.get(&delivery_id).cloned()
        }

        /// All delivery rows, unordered.
        pub async fn all_deliveries(&self) -> Vec<Delivery> {
            self.deliveries.read().await.values().cloned().collect()
        }
    }

    #[async_trait]
    impl DeliveryStore for MockDeliveryStore {
        async fn find_delivery(&self, delivery_id: DeliveryId) -> Result<Option<Delivery>> {
            Ok(self.deliveries.read().await.get(&delivery_id).cloned())
        }

        async fn find_webhook(&self, webhook_id: WebhookId) -> Result<Option<Webhook>> {
            Ok(self.webhooks.read().await.get(&webhook_id).cloned())
        }

        async fn list_enabled_webhooks(&self) -> Result<Vec<Webhook>> {
            if let Some(error) = self.list_error.write().await.take() {
                return Err(CoreError::Database(error));
            }

            let mut webhooks: Vec<Webhook> =
                self.webhooks.read().await.values().filter(|w| w.enabled).cloned().collect();
            webhooks.sort_by_key(|w| w.created_at);
            Ok(webhooks)
        }

        async fn create_deliveries(&self, deliveries: &[Delivery]) -> Result<()> {
            let mut map = self.deliveries.write().await;
            for delivery in deliveries {
                map.insert(delivery.id, delivery.clone());
            }
            Ok(())
        }

        async fn mark_delivered(
            &self,
            delivery_id: DeliveryId,
            attempts: i32,
            response_status: i32,
            response_body: &str,
            delivered_at: DateTime<Utc>,
        ) -> Result<()> {
            if let Some(delivery) = self.deliveries.write().await.get_mut(&delivery_id) {
                delivery.status = DeliveryStatus::Delivered;
                delivery.attempts = attempts;
                delivery.response_status = Some(response_status);
                delivery.response_body = Some(response_body.to_string());
                delivery.error = None;
                delivery.next_retry_at = None;
                delivery.delivered_at = Some(delivered_at);
                delivery.updated_at = delivered_at;
            }
            Ok(())
        }

        async fn schedule_retry(
            &self,
            delivery_id: DeliveryId,
            attempts: i32,
            next_retry_at: DateTime<Utc>,
            response_status: Option<i32>,
            response_body: Option<&str>,
            error: &str,
        ) -> Result<()> {
            if let Some(delivery) = self.deliveries.write().await.get_mut(&delivery_id) {
                delivery.status = DeliveryStatus::Retrying;
                delivery.attempts = attempts;
                delivery.next_retry_at = Some(next_retry_at);
                delivery.response_status = response_status;
                delivery.response_body = response_body.map(ToString::to_string);
                delivery.error = Some(error.to_string());
            }
            Ok(())
        }

        async fn mark_failed(
            &self,
            delivery_id: DeliveryId,
            attempts: i32,
            response_status: Option<i32>,
            response_body: Option<&str>,
            error: &str,
        ) -> Result<()> {
            if let Some(delivery) = self.deliveries.write().await.get_mut(&delivery_id) {
                delivery.status = DeliveryStatus::Failed;
                delivery.attempts = attempts;
                delivery.next_retry_at = None;
                delivery.response_status = response_status;
                delivery.response_body = response_body.map(ToString::to_string);
                delivery.error = Some(error.to_string());
            }
            Ok(())
        }

        async fn due_retries(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<DeliveryId>> {
            let map = self.deliveries.read().await;
            let mut due: Vec<&Delivery> = map
                .values()
                .filter(|d| {
                    d.status == DeliveryStatus::Retrying
                        && d.next_retry_at.is_some_and(|at| at <= now)
                })
                .collect();
            due.sort_by_key(|d| d.next_retry_at);

            Ok(due
                .into_iter()
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .map(|d| d.id)
                .collect())
        }
    }
}
