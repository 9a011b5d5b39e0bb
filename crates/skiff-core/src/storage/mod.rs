//! Database access layer implementing the repository pattern.
//!
//! The repository layer translates between domain models and database
//! schemas so schema evolution never leaks into domain logic. All
//! database operations go through these repositories; direct SQL outside
//! this module is forbidden to maintain consistency.

use std::sync::Arc;

use sqlx::PgPool;

pub mod deliveries;
pub mod kpi;
pub mod metrics;
pub mod webhooks;

use crate::error::Result;

/// Container for all repository instances providing unified database
/// access.
#[derive(Clone)]
pub struct Storage {
    /// Repository for webhook configuration.
    pub webhooks: Arc<webhooks::Repository>,

    /// Repository for delivery lifecycle tracking.
    pub deliveries: Arc<deliveries::Repository>,

    /// Repository for metric sample batches.
    pub metrics: Arc<metrics::Repository>,

    /// Repository for KPI snapshots.
    pub kpi: Arc<kpi::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            webhooks: Arc::new(webhooks::Repository::new(pool.clone())),
            deliveries: Arc::new(deliveries::Repository::new(pool.clone())),
            metrics: Arc::new(metrics::Repository::new(pool.clone())),
            kpi: Arc::new(kpi::Repository::new(pool)),
        }
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.webhooks.pool()).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_can_be_created() {
        // Instantiation only; database behavior is covered by the
        // trait-level mocks in the dependent crates.
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = Storage::new(pool);
    }
}
