//! Repository for metric sample batches.
//!
//! Samples are append-only: each collection cycle inserts one batch and
//! nothing ever updates them. The cleanup task evicts by age.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};

use crate::{
    error::Result,
    models::{EndpointId, MetricSample},
};

/// Repository for metric sample database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts one cycle's samples as a single batch.
    ///
    /// An empty batch is a no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn insert_batch(&self, samples: &[MetricSample]) -> Result<u64> {
        if samples.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::new(
            "INSERT INTO metric_samples \
             (endpoint_id, container_id, container_name, kind, value, recorded_at) ",
        );

        builder.push_values(samples, |mut row, sample| {
            row.push_bind(sample.endpoint_id.0)
                .push_bind(&sample.container_id)
                .push_bind(&sample.container_name)
                .push_bind(sample.kind.to_string())
                .push_bind(sample.value)
                .push_bind(sample.recorded_at);
        });

        let result = builder.build().execute(&*self.pool).await?;

        Ok(result.rows_affected())
    }

    /// Finds recent samples for a container, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_recent(
        &self,
        endpoint_id: EndpointId,
        container_id: &str,
        limit: i64,
    ) -> Result<Vec<MetricSample>> {
        let samples = sqlx::query_as::<_, MetricSample>(
            r#"
            SELECT endpoint_id, container_id, container_name, kind, value, recorded_at
            FROM metric_samples
            WHERE endpoint_id = $1 AND container_id = $2
            ORDER BY recorded_at DESC
            LIMIT $3
            "#,
        )
        .bind(endpoint_id.0)
        .bind(container_id)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(samples)
    }

    /// Deletes samples recorded before the cutoff.
    ///
    /// # Errors
    ///
    /// Returns error if delete fails.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM metric_samples WHERE recorded_at < $1")
            .bind(cutoff)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
