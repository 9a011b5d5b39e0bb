//! Repository for webhook delivery lifecycle tracking.
//!
//! Deliveries are single-writer rows: the worker owns all status,
//! attempt, and retry-time updates for a given ID. The dispatcher only
//! inserts fresh rows; the sweeper only selects due ones.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Delivery, DeliveryId, DeliveryStatus, WebhookId},
};

const DELIVERY_COLUMNS: &str = "id, webhook_id, event_type, payload, status, attempts, \
     max_attempts, next_retry_at, response_status, response_body, error, delivered_at, \
     created_at, updated_at";

/// Repository for delivery database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts all deliveries created for one dispatched event.
    ///
    /// Runs as a single transaction so an event either produces its full
    /// delivery list or none of it.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction or any insert fails.
    pub async fn create_batch(&self, deliveries: &[Delivery]) -> Result<()> {
        if deliveries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for delivery in deliveries {
            sqlx::query(
                r#"
                INSERT INTO deliveries (
                    id, webhook_id, event_type, payload, status, attempts, max_attempts,
                    next_retry_at, response_status, response_body, error, delivered_at,
                    created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(delivery.id.0)
            .bind(delivery.webhook_id.0)
            .bind(&delivery.event_type)
            .bind(&delivery.payload)
            .bind(delivery.status)
            .bind(delivery.attempts)
            .bind(delivery.max_attempts)
            .bind(delivery.next_retry_at)
            .bind(delivery.response_status)
            .bind(&delivery.response_body)
            .bind(&delivery.error)
            .bind(delivery.delivered_at)
            .bind(delivery.created_at)
            .bind(delivery.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Finds a delivery by ID.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, delivery_id: DeliveryId) -> Result<Option<Delivery>> {
        let delivery = sqlx::query_as::<_, Delivery>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE id = $1"
        ))
        .bind(delivery_id.0)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(delivery)
    }

    /// Marks a delivery as successfully delivered. Terminal.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn mark_delivered(
        &self,
        delivery_id: DeliveryId,
        attempts: i32,
        response_status: i32,
        response_body: &str,
        delivered_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'delivered', attempts = $1, response_status = $2, response_body = $3,
                error = NULL, next_retry_at = NULL, delivered_at = $4, updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(attempts)
        .bind(response_status)
        .bind(response_body)
        .bind(delivered_at)
        .bind(delivery_id.0)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Schedules a failed delivery for another attempt.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn schedule_retry(
        &self,
        delivery_id: DeliveryId,
        attempts: i32,
        next_retry_at: DateTime<Utc>,
        response_status: Option<i32>,
        response_body: Option<&str>,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'retrying', attempts = $1, next_retry_at = $2,
                response_status = $3, response_body = $4, error = $5, updated_at = NOW()
            WHERE id = $6
            "#,
        )
        .bind(attempts)
        .bind(next_retry_at)
        .bind(response_status)
        .bind(response_body)
        .bind(error)
        .bind(delivery_id.0)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Marks a delivery as permanently failed. Terminal.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn mark_failed(
        &self,
        delivery_id: DeliveryId,
        attempts: i32,
        response_status: Option<i32>,
        response_body: Option<&str>,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE deliveries
            SET status = 'failed', attempts = $1, next_retry_at = NULL,
                response_status = $2, response_body = $3, error = $4, updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(attempts)
        .bind(response_status)
        .bind(response_body)
        .bind(error)
        .bind(delivery_id.0)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds deliveries in `retrying` whose retry time has elapsed.
    ///
    /// Bounded so one sweep tick never grows unboundedly; oldest due rows
    /// first.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_due_retries(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DeliveryId>> {
        let ids: Vec<uuid::Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM deliveries
            WHERE status = 'retrying' AND next_retry_at <= $1
            ORDER BY next_retry_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(ids.into_iter().map(DeliveryId).collect())
    }

    /// Finds deliveries for a webhook, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_webhook(
        &self,
        webhook_id: WebhookId,
        limit: Option<i64>,
    ) -> Result<Vec<Delivery>> {
        let deliveries = sqlx::query_as::<_, Delivery>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM deliveries \
             WHERE webhook_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(webhook_id.0)
        .bind(limit.unwrap_or(100))
        .fetch_all(&*self.pool)
        .await?;

        Ok(deliveries)
    }

    /// Counts deliveries by status.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn count_by_status(&self, status: DeliveryStatus) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM deliveries WHERE status = $1")
            .bind(status)
            .fetch_one(&*self.pool)
            .await?;

        Ok(count.0)
    }

    /// Deletes terminal deliveries older than the cutoff.
    ///
    /// Used by the cleanup task; active deliveries are never touched.
    ///
    /// # Errors
    ///
    /// Returns error if delete fails.
    pub async fn purge_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM deliveries
            WHERE status IN ('delivered', 'failed') AND updated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
