//! Repository for webhook configuration.
//!
//! Webhooks are snapshot-read on every dispatch, so updates here take
//! effect on the next event without cache invalidation.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Webhook, WebhookId},
};

/// Repository for webhook database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Creates a new webhook.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails or constraints are violated.
    pub async fn create(&self, webhook: &Webhook) -> Result<WebhookId> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO webhooks (id, name, url, secret, events, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(webhook.id.0)
        .bind(&webhook.name)
        .bind(&webhook.url)
        .bind(&webhook.secret)
        .bind(&webhook.events)
        .bind(webhook.enabled)
        .bind(webhook.created_at)
        .bind(webhook.updated_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(WebhookId(id))
    }

    /// Updates a webhook's mutable fields.
    ///
    /// The secret is written as-is: callers rotate it explicitly, it is
    /// never regenerated here.
    ///
    /// # Errors
    ///
    /// Returns error if update fails.
    pub async fn update(&self, webhook: &Webhook) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhooks
            SET name = $1, url = $2, secret = $3, events = $4, enabled = $5, updated_at = NOW()
            WHERE id = $6
            "#,
        )
        .bind(&webhook.name)
        .bind(&webhook.url)
        .bind(&webhook.secret)
        .bind(&webhook.events)
        .bind(webhook.enabled)
        .bind(webhook.id.0)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds a webhook by ID.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_id(&self, webhook_id: WebhookId) -> Result<Option<Webhook>> {
        let webhook = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT id, name, url, secret, events, enabled, created_at, updated_at
            FROM webhooks
            WHERE id = $1
            "#,
        )
        .bind(webhook_id.0)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(webhook)
    }

    /// Lists all enabled webhooks.
    ///
    /// This is the dispatcher's per-event snapshot read.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn list_enabled(&self) -> Result<Vec<Webhook>> {
        let webhooks = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT id, name, url, secret, events, enabled, created_at, updated_at
            FROM webhooks
            WHERE enabled = TRUE
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(webhooks)
    }

    /// Lists every webhook regardless of enabled state.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn list_all(&self) -> Result<Vec<Webhook>> {
        let webhooks = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT id, name, url, secret, events, enabled, created_at, updated_at
            FROM webhooks
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(webhooks)
    }

    /// Deletes a webhook.
    ///
    /// Deliveries already created for it keep running until their next
    /// attempt finds the row gone and fails terminally.
    ///
    /// # Errors
    ///
    /// Returns error if delete fails.
    pub async fn delete(&self, webhook_id: WebhookId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(webhook_id.0)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
