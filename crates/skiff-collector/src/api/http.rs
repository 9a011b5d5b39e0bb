//! HTTP implementation of the upstream orchestration API.
//!
//! Talks to a Portainer-compatible REST surface: endpoint listing, the
//! per-endpoint Docker proxy for container enumeration, and one-shot
//! stats reads. All calls carry a hard timeout so a stuck endpoint can
//! only cost one request slot, never a cycle.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use skiff_core::models::EndpointId;

use super::{ApiError, ContainerApi, ContainerStats, ContainerSummary, EndpointInfo, Result};

/// Default timeout for one upstream request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Endpoint types that expose the live Docker proxy.
const LIVE_CAPABLE_TYPES: [i64; 2] = [1, 2];

/// Upstream endpoint status value meaning "up".
const ENDPOINT_STATUS_UP: i64 = 1;

/// HTTP client for the orchestration API.
pub struct HttpContainerApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpContainerApi {
    /// Creates a new client for the given API base URL and access key.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::upstream(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ApiError::upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::upstream(format!("HTTP {status} from {path}")));
        }

        response.json().await.map_err(|e| ApiError::decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct EndpointDto {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Type")]
    endpoint_type: i64,
    #[serde(rename = "Status")]
    status: i64,
}

#[derive(Debug, Deserialize)]
struct ContainerDto {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Image", default)]
    image: String,
}

#[derive(Debug, Deserialize)]
struct ImageDto {
    #[serde(rename = "Created")]
    created: i64,
    #[serde(rename = "RepoTags", default)]
    repo_tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StatsDto {
    cpu_stats: CpuStatsDto,
    precpu_stats: CpuStatsDto,
    memory_stats: MemoryStatsDto,
    #[serde(default)]
    networks: HashMap<String, NetworkDto>,
}

#[derive(Debug, Deserialize)]
struct CpuStatsDto {
    cpu_usage: CpuUsageDto,
    #[serde(default)]
    system_cpu_usage: u64,
    #[serde(default)]
    online_cpus: u64,
}

#[derive(Debug, Deserialize)]
struct CpuUsageDto {
    total_usage: u64,
}

#[derive(Debug, Deserialize)]
struct MemoryStatsDto {
    #[serde(default)]
    usage: u64,
    #[serde(default)]
    limit: u64,
}

#[derive(Debug, Deserialize)]
struct NetworkDto {
    #[serde(default)]
    rx_bytes: u64,
    #[serde(default)]
    tx_bytes: u64,
}

impl StatsDto {
    /// Standard Docker CPU percentage: usage delta over system delta,
    /// scaled by the online CPU count.
    fn cpu_percent(&self) -> f64 {
        let cpu_delta = self
            .cpu_stats
            .cpu_usage
            .total_usage
            .saturating_sub(self.precpu_stats.cpu_usage.total_usage) as f64;
        let system_delta =
            self.cpu_stats.system_cpu_usage.saturating_sub(self.precpu_stats.system_cpu_usage)
                as f64;

        if system_delta <= 0.0 || cpu_delta < 0.0 {
            return 0.0;
        }

        let cpus = if self.cpu_stats.online_cpus > 0 { self.cpu_stats.online_cpus } else { 1 };
        (cpu_delta / system_delta) * cpus as f64 * 100.0
    }

    fn memory_percent(&self) -> f64 {
        if self.memory_stats.limit == 0 {
            return 0.0;
        }
        self.memory_stats.usage as f64 / self.memory_stats.limit as f64 * 100.0
    }

    fn network_totals(&self) -> (u64, u64) {
        self.networks.values().fold((0, 0), |(rx, tx), net| {
            (rx.saturating_add(net.rx_bytes), tx.saturating_add(net.tx_bytes))
        })
    }
}

#[async_trait]
impl ContainerApi for HttpContainerApi {
    async fn ping(&self) -> Result<()> {
        let _: serde_json::Value = self.get_json("/api/status").await?;
        Ok(())
    }

    async fn list_endpoints(&self) -> Result<Vec<EndpointInfo>> {
        let endpoints: Vec<EndpointDto> = self.get_json("/api/endpoints").await?;

        Ok(endpoints
            .into_iter()
            .map(|dto| EndpointInfo {
                id: EndpointId(dto.id),
                name: dto.name,
                live_stats_capable: LIVE_CAPABLE_TYPES.contains(&dto.endpoint_type),
                degraded: dto.status != ENDPOINT_STATUS_UP,
            })
            .collect())
    }

    async fn list_running_containers(
        &self,
        endpoint_id: EndpointId,
    ) -> Result<Vec<ContainerSummary>> {
        let containers: Vec<ContainerDto> = self
            .get_json(&format!(
                "/api/endpoints/{endpoint_id}/docker/containers/json?filters=%7B%22status%22%3A%5B%22running%22%5D%7D"
            ))
            .await?;

        // Image creation times come from the image list, joined by tag.
        let images: Vec<ImageDto> = self
            .get_json(&format!("/api/endpoints/{endpoint_id}/docker/images/json"))
            .await
            .unwrap_or_default();
        let created_by_tag: HashMap<&str, i64> = images
            .iter()
            .flat_map(|img| img.repo_tags.iter().map(move |tag| (tag.as_str(), img.created)))
            .collect();

        Ok(containers
            .into_iter()
            .map(|dto| {
                let image_created_at = created_by_tag
                    .get(dto.image.as_str())
                    .and_then(|&secs| DateTime::<Utc>::from_timestamp(secs, 0));
                ContainerSummary {
                    name: dto
                        .names
                        .first()
                        .map(|n| n.trim_start_matches('/').to_string())
                        .unwrap_or_else(|| dto.id.clone()),
                    id: dto.id,
                    image: dto.image,
                    image_created_at,
                }
            })
            .collect())
    }

    async fn container_stats(
        &self,
        endpoint_id: EndpointId,
        container_id: &str,
    ) -> Result<ContainerStats> {
        let stats: StatsDto = self
            .get_json(&format!(
                "/api/endpoints/{endpoint_id}/docker/containers/{container_id}/stats?stream=false"
            ))
            .await?;

        let (network_rx_bytes, network_tx_bytes) = stats.network_totals();

        Ok(ContainerStats {
            cpu_percent: stats.cpu_percent(),
            memory_percent: stats.memory_percent(),
            memory_bytes: stats.memory_stats.usage,
            network_rx_bytes,
            network_tx_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu(total: u64, system: u64, cpus: u64) -> CpuStatsDto {
        CpuStatsDto {
            cpu_usage: CpuUsageDto { total_usage: total },
            system_cpu_usage: system,
            online_cpus: cpus,
        }
    }

    #[test]
    fn cpu_percent_uses_usage_deltas() {
        let stats = StatsDto {
            cpu_stats: cpu(200, 2000, 2),
            precpu_stats: cpu(100, 1000, 2),
            memory_stats: MemoryStatsDto { usage: 0, limit: 0 },
            networks: HashMap::new(),
        };

        // delta 100 over system delta 1000, two CPUs => 20%
        assert!((stats.cpu_percent() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_system_delta_reads_as_idle() {
        let stats = StatsDto {
            cpu_stats: cpu(100, 1000, 2),
            precpu_stats: cpu(100, 1000, 2),
            memory_stats: MemoryStatsDto { usage: 0, limit: 0 },
            networks: HashMap::new(),
        };

        assert_eq!(stats.cpu_percent(), 0.0);
    }

    #[test]
    fn memory_percent_guards_zero_limit() {
        let stats = StatsDto {
            cpu_stats: cpu(0, 0, 0),
            precpu_stats: cpu(0, 0, 0),
            memory_stats: MemoryStatsDto { usage: 512, limit: 0 },
            networks: HashMap::new(),
        };

        assert_eq!(stats.memory_percent(), 0.0);
    }

    #[test]
    fn network_totals_sum_all_interfaces() {
        let mut networks = HashMap::new();
        networks.insert("eth0".to_string(), NetworkDto { rx_bytes: 100, tx_bytes: 50 });
        networks.insert("eth1".to_string(), NetworkDto { rx_bytes: 30, tx_bytes: 20 });

        let stats = StatsDto {
            cpu_stats: cpu(0, 0, 0),
            precpu_stats: cpu(0, 0, 0),
            memory_stats: MemoryStatsDto { usage: 0, limit: 0 },
            networks,
        };

        assert_eq!(stats.network_totals(), (130, 70));
    }
}
