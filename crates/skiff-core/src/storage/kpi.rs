//! Repository for KPI snapshot rows.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{error::Result, models::KpiSnapshot};

/// Repository for KPI snapshot database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts one snapshot row.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails.
    pub async fn insert(&self, snapshot: &KpiSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kpi_snapshots (
                recorded_at, endpoints_total, endpoints_degraded, containers_running,
                deliveries_pending, deliveries_failed
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.recorded_at)
        .bind(snapshot.endpoints_total)
        .bind(snapshot.endpoints_degraded)
        .bind(snapshot.containers_running)
        .bind(snapshot.deliveries_pending)
        .bind(snapshot.deliveries_failed)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds the most recent snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_latest(&self, limit: i64) -> Result<Vec<KpiSnapshot>> {
        let snapshots = sqlx::query_as::<_, KpiSnapshot>(
            r#"
            SELECT recorded_at, endpoints_total, endpoints_degraded, containers_running,
                   deliveries_pending, deliveries_failed
            FROM kpi_snapshots
            ORDER BY recorded_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(snapshots)
    }
}
