//! The metrics collection cycle.
//!
//! One cycle per tick: filter endpoints to those that can serve live
//! stats and are not degraded, fan out within two nested concurrency
//! bounds, collect five samples per measured container, and persist the
//! union as a single batch. The cycle guard drops overlapping ticks
//! entirely.

use std::sync::Arc;

use futures::{stream, StreamExt};
use skiff_core::{
    models::{MetricKind, MetricSample},
    Clock, CycleGuard,
};
use tracing::{debug, error, warn};

use crate::{
    api::{ApiError, ContainerApi, ContainerSummary, EndpointInfo},
    rate::NetworkRateTracker,
    sink::MetricSink,
    DEFAULT_CONTAINER_CONCURRENCY, DEFAULT_ENDPOINT_CONCURRENCY,
};

/// Concurrency bounds for one cycle's fan-out.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Endpoints processed concurrently.
    pub endpoint_concurrency: usize,
    /// Containers processed concurrently within one endpoint.
    pub container_concurrency: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint_concurrency: DEFAULT_ENDPOINT_CONCURRENCY,
            container_concurrency: DEFAULT_CONTAINER_CONCURRENCY,
        }
    }
}

/// Result of one collection tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle ran; counts of persisted samples and failed units.
    Completed {
        /// Samples persisted this cycle.
        samples: usize,
        /// Endpoint or container units that failed and were skipped.
        failures: usize,
    },
    /// A previous cycle was still running; this tick did nothing.
    Skipped,
    /// Endpoint listing or the batch write failed; nothing persisted.
    Aborted,
}

struct EndpointCollection {
    samples: Vec<MetricSample>,
    failures: usize,
}

/// Drives guarded, bounded metric collection cycles.
pub struct Collector {
    api: Arc<dyn ContainerApi>,
    sink: Arc<dyn MetricSink>,
    rates: Arc<NetworkRateTracker>,
    clock: Arc<dyn Clock>,
    guard: CycleGuard,
    config: CollectorConfig,
}

impl Collector {
    /// Creates a new collector.
    pub fn new(
        api: Arc<dyn ContainerApi>,
        sink: Arc<dyn MetricSink>,
        rates: Arc<NetworkRateTracker>,
        clock: Arc<dyn Clock>,
        config: CollectorConfig,
    ) -> Self {
        Self { api, sink, rates, clock, guard: CycleGuard::new(), config }
    }

    /// The cycle's overlap guard, exposed so callers can observe it.
    pub fn guard(&self) -> &CycleGuard {
        &self.guard
    }

    /// Runs one collection cycle.
    ///
    /// Never returns an error: systemic failures abort the cycle with a
    /// log line and the next tick tries again independently.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_cycle) = self.guard.try_acquire() else {
            warn!("metrics collection cycle still running, skipping tick");
            return CycleOutcome::Skipped;
        };

        let endpoints = match self.api.list_endpoints().await {
            Ok(endpoints) => endpoints,
            Err(api_error) => {
                error!(error = %api_error, "failed to list endpoints, aborting collection cycle");
                return CycleOutcome::Aborted;
            },
        };

        let total = endpoints.len();
        let eligible: Vec<EndpointInfo> =
            endpoints.into_iter().filter(|e| e.live_stats_capable && !e.degraded).collect();

        if eligible.len() < total {
            debug!(
                eligible = eligible.len(),
                skipped = total - eligible.len(),
                "skipping degraded or non-live endpoints"
            );
        }

        let collections: Vec<EndpointCollection> = stream::iter(eligible)
            .map(|endpoint| self.collect_endpoint(endpoint))
            .buffer_unordered(self.config.endpoint_concurrency.max(1))
            .collect()
            .await;

        let mut samples = Vec::new();
        let mut failures = 0;
        for collection in collections {
            samples.extend(collection.samples);
            failures += collection.failures;
        }

        if failures > 0 {
            warn!(failures, "collection cycle completed with failed units");
        }

        if !samples.is_empty() {
            if let Err(db_error) = self.sink.insert_batch(&samples).await {
                error!(error = %db_error, "failed to persist metric batch");
                return CycleOutcome::Aborted;
            }
        }

        debug!(samples = samples.len(), failures, "collection cycle complete");
        CycleOutcome::Completed { samples: samples.len(), failures }
    }

    /// Collects all running containers on one endpoint, bounded by the
    /// container concurrency limit. An enumeration failure costs one
    /// failed unit; sibling endpoints are unaffected.
    async fn collect_endpoint(&self, endpoint: EndpointInfo) -> EndpointCollection {
        let containers = match self.api.list_running_containers(endpoint.id).await {
            Ok(containers) => containers,
            Err(api_error) => {
                debug!(
                    endpoint_id = %endpoint.id,
                    endpoint = %endpoint.name,
                    error = %api_error,
                    "failed to enumerate containers"
                );
                return EndpointCollection { samples: Vec::new(), failures: 1 };
            },
        };

        let results: Vec<Result<Vec<MetricSample>, ApiError>> = stream::iter(containers)
            .map(|container| self.collect_container(&endpoint, container))
            .buffer_unordered(self.config.container_concurrency.max(1))
            .collect()
            .await;

        let mut samples = Vec::new();
        let mut failures = 0;
        for result in results {
            match result {
                Ok(container_samples) => samples.extend(container_samples),
                Err(_) => failures += 1,
            }
        }

        EndpointCollection { samples, failures }
    }

    /// Measures one container: exactly five samples, plus the network
    /// rate bookkeeping side effect.
    async fn collect_container(
        &self,
        endpoint: &EndpointInfo,
        container: ContainerSummary,
    ) -> Result<Vec<MetricSample>, ApiError> {
        let stats = match self.api.container_stats(endpoint.id, &container.id).await {
            Ok(stats) => stats,
            Err(api_error) => {
                debug!(
                    endpoint_id = %endpoint.id,
                    container = %container.name,
                    error = %api_error,
                    "failed to collect container stats"
                );
                return Err(api_error);
            },
        };

        self.rates.observe(
            &container.id,
            stats.network_rx_bytes,
            stats.network_tx_bytes,
            self.clock.now(),
        );

        let recorded_at = self.clock.now_utc();
        let sample = |kind: MetricKind, value: f64| MetricSample {
            endpoint_id: endpoint.id,
            container_id: container.id.clone(),
            container_name: container.name.clone(),
            kind,
            value,
            recorded_at,
        };

        Ok(vec![
            sample(MetricKind::Cpu, stats.cpu_percent),
            sample(MetricKind::Memory, stats.memory_percent),
            sample(MetricKind::MemoryBytes, stats.memory_bytes as f64),
            sample(MetricKind::NetworkRxBytes, stats.network_rx_bytes as f64),
            sample(MetricKind::NetworkTxBytes, stats.network_tx_bytes as f64),
        ])
    }
}
