//! Core domain models and strongly-typed identifiers.
//!
//! Defines webhooks, deliveries, metric samples, and newtype ID wrappers
//! for compile-time type safety. Includes database serialization traits
//! and the delivery state transition logic.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Default maximum delivery attempts, fixed on each delivery at creation.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Strongly-typed webhook identifier.
///
/// Wraps a UUID to prevent mixing with other ID types. A webhook keeps
/// its ID across updates; only deletion retires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookId(pub Uuid);

impl WebhookId {
    /// Creates a new random webhook ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WebhookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WebhookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for WebhookId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for WebhookId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for WebhookId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for WebhookId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed delivery identifier.
///
/// One delivery is one logical transmission of one event to one webhook,
/// tracked through its whole retry lifecycle under this ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub Uuid);

impl DeliveryId {
    /// Creates a new random delivery ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DeliveryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for DeliveryId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed upstream endpoint identifier.
///
/// The orchestration API identifies endpoints (hosts/agents) with numeric
/// IDs; the wrapper keeps them from mixing with other integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub i64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EndpointId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for EndpointId {
    fn type_info() -> PgTypeInfo {
        <i64 as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EndpointId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <i64 as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl sqlx::Encode<'_, PgDb> for EndpointId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <i64 as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// A webhook subscription: where to deliver, how to sign, what to match.
///
/// Read as a fresh snapshot on every dispatch, so administrative updates
/// take effect on the next event without any cache invalidation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Webhook {
    /// Unique identifier for this webhook.
    pub id: WebhookId,

    /// Human-readable name.
    pub name: String,

    /// Destination URL for deliveries.
    pub url: String,

    /// Shared HMAC secret. Supplied or generated at creation, never
    /// regenerated implicitly.
    pub secret: String,

    /// Subscribed event patterns (`*`, `prefix.*`, or exact type).
    pub events: Vec<String>,

    /// Disabled webhooks are skipped by the dispatcher.
    pub enabled: bool,

    /// When this webhook was created.
    pub created_at: DateTime<Utc>,

    /// When this webhook was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    /// Creates a webhook, generating a secret when none is supplied.
    ///
    /// The secret is fixed here and only changes through an explicit
    /// update; nothing regenerates it implicitly.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        secret: Option<String>,
        events: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let secret = secret.unwrap_or_else(|| {
            format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
        });

        Self {
            id: WebhookId::new(),
            name: name.into(),
            url: url.into(),
            secret,
            events,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Delivery lifecycle status.
///
/// ```text
/// Pending ──▶ Delivered
///    │   ──▶ Retrying ──▶ Delivered
///    │           │    ──▶ Retrying
///    │           └────▶ Failed
///    └──────▶ Failed
/// ```
///
/// `Delivered` and `Failed` are terminal; a delivery never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Created by the dispatcher, not yet attempted.
    Pending,

    /// At least one attempt failed; scheduled for re-attempt.
    Retrying,

    /// Accepted by the target with a 2xx response. Terminal.
    Delivered,

    /// Webhook missing or attempts exhausted. Terminal.
    Failed,
}

impl DeliveryStatus {
    /// Whether this status permits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending | Self::Retrying => {
                matches!(next, Self::Delivered | Self::Retrying | Self::Failed)
            },
            Self::Delivered | Self::Failed => false,
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "retrying" => Ok(Self::Retrying),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

impl sqlx::Type<PgDb> for DeliveryStatus {
    fn type_info() -> PgTypeInfo {
        <String as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for DeliveryStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(s.parse()?)
    }
}

impl sqlx::Encode<'_, PgDb> for DeliveryStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// One logical delivery of one event to one webhook.
///
/// Mutated only by the delivery worker; the dispatcher creates fresh rows
/// and the sweeper only selects rows already due for retry, so no two
/// writers ever contend for the same ID.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Delivery {
    /// Unique identifier for this delivery.
    pub id: DeliveryId,

    /// Owning webhook.
    pub webhook_id: WebhookId,

    /// Dotted event type string (e.g. `container.stopped`).
    pub event_type: String,

    /// Serialized event payload; sent byte-identical to what is stored.
    pub payload: String,

    /// Current lifecycle status.
    pub status: DeliveryStatus,

    /// Attempts made so far. Monotonically non-decreasing, bounded by
    /// `max_attempts`.
    pub attempts: i32,

    /// Attempt budget, fixed at creation.
    pub max_attempts: i32,

    /// When the next attempt is due, while status is `retrying`.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// HTTP status of the last attempt, if the target responded.
    pub response_status: Option<i32>,

    /// Truncated response body of the last attempt.
    pub response_body: Option<String>,

    /// Error detail of the last failed attempt.
    pub error: Option<String>,

    /// When the delivery succeeded.
    pub delivered_at: Option<DateTime<Utc>>,

    /// When this delivery was created.
    pub created_at: DateTime<Utc>,

    /// When this delivery was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    /// Creates a fresh pending delivery for a matched webhook.
    pub fn pending(
        webhook_id: WebhookId,
        event_type: impl Into<String>,
        payload: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeliveryId::new(),
            webhook_id,
            event_type: event_type.into(),
            payload: payload.into(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            next_retry_at: None,
            response_status: None,
            response_body: None,
            error: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Kind of metric emitted per measured container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// CPU usage percentage.
    Cpu,
    /// Memory usage percentage.
    Memory,
    /// Memory usage in bytes.
    MemoryBytes,
    /// Cumulative network bytes received.
    NetworkRxBytes,
    /// Cumulative network bytes transmitted.
    NetworkTxBytes,
}

impl MetricKind {
    /// All kinds emitted per container, in persistence order.
    pub const ALL: [Self; 5] =
        [Self::Cpu, Self::Memory, Self::MemoryBytes, Self::NetworkRxBytes, Self::NetworkTxBytes];
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::MemoryBytes => "memory_bytes",
            Self::NetworkRxBytes => "network_rx_bytes",
            Self::NetworkTxBytes => "network_tx_bytes",
        };
        write!(f, "{s}")
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "memory" => Ok(Self::Memory),
            "memory_bytes" => Ok(Self::MemoryBytes),
            "network_rx_bytes" => Ok(Self::NetworkRxBytes),
            "network_tx_bytes" => Ok(Self::NetworkTxBytes),
            other => Err(format!("unknown metric kind: {other}")),
        }
    }
}

impl sqlx::Type<PgDb> for MetricKind {
    fn type_info() -> PgTypeInfo {
        <String as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for MetricKind {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(s.parse()?)
    }
}

impl sqlx::Encode<'_, PgDb> for MetricKind {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// One metric observation for one container.
///
/// Ephemeral: produced per collection cycle, written once as part of a
/// batch, never mutated. Retention is the cleanup task's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MetricSample {
    /// Endpoint the container runs on.
    pub endpoint_id: EndpointId,

    /// Container identifier from the orchestration API.
    pub container_id: String,

    /// Container name at collection time.
    pub container_name: String,

    /// Kind of metric.
    pub kind: MetricKind,

    /// Observed value.
    pub value: f64,

    /// When the sample was collected.
    pub recorded_at: DateTime<Utc>,
}

/// Coarse fleet-level counters persisted by the KPI snapshot task.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KpiSnapshot {
    /// When the snapshot was taken.
    pub recorded_at: DateTime<Utc>,

    /// Endpoints known to the upstream API.
    pub endpoints_total: i32,

    /// Endpoints currently reported degraded.
    pub endpoints_degraded: i32,

    /// Running containers across all non-degraded endpoints.
    pub containers_running: i32,

    /// Deliveries currently pending or retrying.
    pub deliveries_pending: i64,

    /// Deliveries in terminal failed state.
    pub deliveries_failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_status_display_roundtrip() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Retrying,
            DeliveryStatus::Delivered,
            DeliveryStatus::Failed,
        ] {
            let parsed: DeliveryStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("delivering".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn terminal_states_admit_no_transitions() {
        for terminal in [DeliveryStatus::Delivered, DeliveryStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in [
                DeliveryStatus::Pending,
                DeliveryStatus::Retrying,
                DeliveryStatus::Delivered,
                DeliveryStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn active_states_transition_forward_only() {
        for active in [DeliveryStatus::Pending, DeliveryStatus::Retrying] {
            assert!(!active.is_terminal());
            assert!(active.can_transition_to(DeliveryStatus::Delivered));
            assert!(active.can_transition_to(DeliveryStatus::Retrying));
            assert!(active.can_transition_to(DeliveryStatus::Failed));
            assert!(!active.can_transition_to(DeliveryStatus::Pending));
        }
    }

    #[test]
    fn pending_delivery_starts_with_zero_attempts() {
        let now = Utc::now();
        let delivery = Delivery::pending(WebhookId::new(), "container.stopped", "{}", now);

        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert_eq!(delivery.attempts, 0);
        assert_eq!(delivery.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(delivery.next_retry_at.is_none());
        assert!(delivery.delivered_at.is_none());
    }

    #[test]
    fn webhook_secret_generated_when_not_supplied() {
        let now = Utc::now();
        let generated =
            Webhook::new("ops", "https://example.com/hook", None, vec!["*".into()], now);
        let supplied = Webhook::new(
            "ops",
            "https://example.com/hook",
            Some("s3cret".to_string()),
            vec!["*".into()],
            now,
        );

        assert_eq!(generated.secret.len(), 64);
        assert_eq!(supplied.secret, "s3cret");

        let other = Webhook::new("ops", "https://example.com/hook", None, vec![], now);
        assert_ne!(generated.secret, other.secret);
    }

    #[test]
    fn metric_kind_names_are_stable() {
        let names: Vec<String> = MetricKind::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            ["cpu", "memory", "memory_bytes", "network_rx_bytes", "network_tx_bytes"]
        );
    }
}
