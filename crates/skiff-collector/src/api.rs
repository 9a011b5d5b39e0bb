//! Upstream container-orchestration API abstraction.
//!
//! The collector talks to the orchestration API only through
//! [`ContainerApi`], so cycles can run against the HTTP implementation in
//! production and the in-memory mock in tests. Degraded endpoints are
//! reported by the upstream health signal and must be skipped by
//! callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skiff_core::models::EndpointId;
use thiserror::Error;

pub mod http;
pub mod mock;

/// Result type alias for upstream API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors from the upstream orchestration API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Request failed or the upstream returned an error status.
    #[error("upstream API error: {message}")]
    Upstream {
        /// Error detail.
        message: String,
    },

    /// Response could not be decoded.
    #[error("upstream response decode error: {message}")]
    Decode {
        /// Error detail.
        message: String,
    },
}

impl ApiError {
    /// Creates an upstream error from a message.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream { message: message.into() }
    }

    /// Creates a decode error from a message.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode { message: message.into() }
    }
}

/// One endpoint (host or agent) known to the orchestration API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Endpoint identifier.
    pub id: EndpointId,
    /// Human-readable endpoint name.
    pub name: String,
    /// Whether the endpoint can serve live container stats.
    pub live_stats_capable: bool,
    /// Whether the upstream health signal currently reports the
    /// endpoint degraded (circuit-broken). Degraded endpoints are
    /// skipped by collection.
    pub degraded: bool,
}

/// One running container on an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Container identifier.
    pub id: String,
    /// Container name.
    pub name: String,
    /// Image reference the container runs.
    pub image: String,
    /// When the image was created, when the upstream reports it.
    pub image_created_at: Option<DateTime<Utc>>,
}

/// Live resource statistics for one container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerStats {
    /// CPU usage percentage.
    pub cpu_percent: f64,
    /// Memory usage percentage.
    pub memory_percent: f64,
    /// Memory usage in bytes.
    pub memory_bytes: u64,
    /// Cumulative network bytes received.
    pub network_rx_bytes: u64,
    /// Cumulative network bytes transmitted.
    pub network_tx_bytes: u64,
}

/// Upstream container-orchestration API operations.
#[async_trait]
pub trait ContainerApi: Send + Sync + 'static {
    /// Cheap reachability probe, used by startup sequencing.
    async fn ping(&self) -> Result<()>;

    /// Lists all endpoints with capability and health flags.
    async fn list_endpoints(&self) -> Result<Vec<EndpointInfo>>;

    /// Lists running containers on one endpoint.
    async fn list_running_containers(
        &self,
        endpoint_id: EndpointId,
    ) -> Result<Vec<ContainerSummary>>;

    /// Fetches live stats for one container.
    async fn container_stats(
        &self,
        endpoint_id: EndpointId,
        container_id: &str,
    ) -> Result<ContainerStats>;
}
