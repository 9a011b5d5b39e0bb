//! Metric persistence abstraction for the collection cycle.
//!
//! The cycle writes one batch per tick through [`MetricSink`], keeping
//! it testable without a database. Production uses the PostgreSQL
//! repository; tests use the in-memory mock.

use std::sync::Arc;

use async_trait::async_trait;
use skiff_core::{error::Result, models::MetricSample, storage::Storage};

/// Destination for one cycle's metric batch.
#[async_trait]
pub trait MetricSink: Send + Sync + 'static {
    /// Inserts the batch. An empty batch must be a no-op.
    async fn insert_batch(&self, samples: &[MetricSample]) -> Result<u64>;
}

/// Production sink backed by the PostgreSQL metrics repository.
pub struct PostgresMetricSink {
    storage: Arc<Storage>,
}

impl PostgresMetricSink {
    /// Creates a new PostgreSQL sink adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl MetricSink for PostgresMetricSink {
    async fn insert_batch(&self, samples: &[MetricSample]) -> Result<u64> {
        self.storage.metrics.insert_batch(samples).await
    }
}

pub mod mock {
    //! In-memory sink recording batches for assertions.

    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use skiff_core::error::CoreError;
    use tokio::sync::RwLock;

    use super::{async_trait, MetricSample, MetricSink, Result};

    /// Mock sink with call counting and failure injection.
    #[derive(Default)]
    pub struct MockMetricSink {
        batches: RwLock<Vec<Vec<MetricSample>>>,
        /// Number of `insert_batch` invocations, including empty ones.
        pub insert_calls: AtomicU64,
        fail_next: AtomicBool,
    }

    impl MockMetricSink {
        /// Creates an empty mock sink.
        pub fn new() -> Self {
            Self::default()
        }

        /// Fails the next insert.
        pub fn inject_insert_error(&self) {
            self.fail_next.store(true, Ordering::Relaxed);
        }

        /// All recorded batches, in insertion order.
        pub async fn batches(&self) -> Vec<Vec<MetricSample>> {
            self.batches.read().await.clone()
        }

        /// All recorded samples, flattened.
        pub async fn samples(&self) -> Vec<MetricSample> {
            self.batches.read().await.iter().flatten().cloned().collect()
        }
    }

    #[async_trait]
    impl MetricSink for MockMetricSink {
        async fn insert_batch(&self, samples: &[MetricSample]) -> Result<u64> {
            self.insert_calls.fetch_add(1, Ordering::Relaxed);

            if self.fail_next.swap(false, Ordering::Relaxed) {
                return Err(CoreError::Database("injected insert failure".to_string()));
            }

            self.batches.write().await.push(samples.to_vec());
            Ok(samples.len() as u64)
        }
    }
}
