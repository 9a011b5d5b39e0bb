//! In-memory upstream API for testing cycles without a live fleet.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
};

use async_trait::async_trait;
use skiff_core::models::EndpointId;
use tokio::sync::RwLock;

use super::{ApiError, ContainerApi, ContainerStats, ContainerSummary, EndpointInfo, Result};

/// Call counters for verifying what a cycle touched.
#[derive(Debug, Default)]
pub struct ApiCallCounters {
    /// `ping` invocations.
    pub ping: AtomicU64,
    /// `list_endpoints` invocations.
    pub list_endpoints: AtomicU64,
    /// `list_running_containers` invocations.
    pub list_containers: AtomicU64,
    /// `container_stats` invocations.
    pub container_stats: AtomicU64,
}

impl ApiCallCounters {
    /// Total invocations across all methods.
    pub fn total(&self) -> u64 {
        self.ping.load(Ordering::Relaxed)
            + self.list_endpoints.load(Ordering::Relaxed)
            + self.list_containers.load(Ordering::Relaxed)
            + self.container_stats.load(Ordering::Relaxed)
    }
}

/// Mock upstream API with injectable failures and call counting.
#[derive(Default)]
pub struct MockContainerApi {
    endpoints: RwLock<Vec<EndpointInfo>>,
    containers: RwLock<HashMap<i64, Vec<ContainerSummary>>>,
    stats: RwLock<HashMap<String, ContainerStats>>,
    fail_list_endpoints: AtomicBool,
    fail_containers_for: RwLock<HashSet<i64>>,
    fail_stats_for: RwLock<HashSet<String>>,
    remaining_ping_failures: AtomicU32,
    /// Invocation counters, public for assertions.
    pub calls: ApiCallCounters,
}

impl MockContainerApi {
    /// Creates an empty mock fleet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an endpoint.
    pub async fn add_endpoint(&self, endpoint: EndpointInfo) {
        self.endpoints.write().await.push(endpoint);
    }

    /// Adds a running container with its stats.
    pub async fn add_container(
        &self,
        endpoint_id: EndpointId,
        container: ContainerSummary,
        stats: ContainerStats,
    ) {
        self.stats.write().await.insert(container.id.clone(), stats);
        self.containers.write().await.entry(endpoint_id.0).or_default().push(container);
    }

    /// Overwrites the stats of an existing container.
    pub async fn set_stats(&self, container_id: &str, stats: ContainerStats) {
        self.stats.write().await.insert(container_id.to_string(), stats);
    }

    /// Fails every subsequent `list_endpoints` call.
    pub fn fail_list_endpoints(&self) {
        self.fail_list_endpoints.store(true, Ordering::Relaxed);
    }

    /// Fails container enumeration for one endpoint.
    pub async fn fail_containers_for(&self, endpoint_id: EndpointId) {
        self.fail_containers_for.write().await.insert(endpoint_id.0);
    }

    /// Fails stats collection for one container.
    pub async fn fail_stats_for(&self, container_id: &str) {
        self.fail_stats_for.write().await.insert(container_id.to_string());
    }

    /// Makes the next `n` pings fail before the probe succeeds.
    pub fn fail_pings(&self, n: u32) {
        self.remaining_ping_failures.store(n, Ordering::Relaxed);
    }
}

#[async_trait]
impl ContainerApi for MockContainerApi {
    async fn ping(&self) -> Result<()> {
        self.calls.ping.fetch_add(1, Ordering::Relaxed);

        let remaining = self.remaining_ping_failures.load(Ordering::Relaxed);
        if remaining > 0 {
            self.remaining_ping_failures.store(remaining - 1, Ordering::Relaxed);
            return Err(ApiError::upstream("ping failed"));
        }
        Ok(())
    }

    async fn list_endpoints(&self) -> Result<Vec<EndpointInfo>> {
        self.calls.list_endpoints.fetch_add(1, Ordering::Relaxed);

        if self.fail_list_endpoints.load(Ordering::Relaxed) {
            return Err(ApiError::upstream("endpoint listing failed"));
        }
        Ok(self.endpoints.read().await.clone())
    }

    async fn list_running_containers(
        &self,
        endpoint_id: EndpointId,
    ) -> Result<Vec<ContainerSummary>> {
        self.calls.list_containers.fetch_add(1, Ordering::Relaxed);

        if self.fail_containers_for.read().await.contains(&endpoint_id.0) {
            return Err(ApiError::upstream(format!(
                "container listing failed for endpoint {endpoint_id}"
            )));
        }
        Ok(self.containers.read().await.get(&endpoint_id.0).cloned().unwrap_or_default())
    }

    async fn container_stats(
        &self,
        _endpoint_id: EndpointId,
        container_id: &str,
    ) -> Result<ContainerStats> {
        self.calls.container_stats.fetch_add(1, Ordering::Relaxed);

        if self.fail_stats_for.read().await.contains(container_id) {
            return Err(ApiError::upstream(format!("stats failed for container {container_id}")));
        }
        self.stats
            .read()
            .await
            .get(container_id)
            .copied()
            .ok_or_else(|| ApiError::upstream(format!("container {container_id} not found")))
    }
}
