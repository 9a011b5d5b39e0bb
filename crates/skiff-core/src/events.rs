//! Typed monitoring events and the broadcast bus that carries them.
//!
//! The event union is closed: every event the system can emit is a
//! variant here, and subscribers receive the full union. The dispatcher
//! filters by the dotted type string, so adding a variant automatically
//! makes it routable to webhooks.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::EndpointId;

/// Buffered events per subscriber before the oldest are dropped.
const BUS_CAPACITY: usize = 256;

/// Domain events observed by the monitoring subsystem.
///
/// Serialization is untagged: the wire payload of an event is the plain
/// JSON object of its fields, with the dotted type carried separately
/// (header `X-Webhook-Event` on deliveries).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MonitorEvent {
    /// A container transitioned to running.
    ContainerStarted {
        /// Endpoint the container runs on.
        endpoint_id: EndpointId,
        /// Container identifier.
        container_id: String,
        /// Container name.
        container_name: String,
    },

    /// A container stopped or exited.
    ContainerStopped {
        /// Endpoint the container ran on.
        endpoint_id: EndpointId,
        /// Container identifier.
        container_id: String,
        /// Container name.
        container_name: String,
        /// Exit code, when the orchestrator reports one.
        exit_code: Option<i64>,
    },

    /// A container's health check started failing.
    ContainerUnhealthy {
        /// Endpoint the container runs on.
        endpoint_id: EndpointId,
        /// Container identifier.
        container_id: String,
        /// Container name.
        container_name: String,
    },

    /// An endpoint stopped responding to the upstream API.
    EndpointDown {
        /// Endpoint that went down.
        endpoint_id: EndpointId,
        /// Endpoint name.
        name: String,
    },

    /// A previously down endpoint recovered.
    EndpointUp {
        /// Endpoint that recovered.
        endpoint_id: EndpointId,
        /// Endpoint name.
        name: String,
    },

    /// A running container's image exceeded the staleness threshold.
    ImageStale {
        /// Endpoint the container runs on.
        endpoint_id: EndpointId,
        /// Container name.
        container_name: String,
        /// Image reference.
        image: String,
        /// Image age in days.
        age_days: i64,
    },

    /// A scheduled backup finished successfully.
    BackupCompleted {
        /// Path of the written backup document.
        path: String,
    },

    /// A scheduled backup failed.
    BackupFailed {
        /// Failure detail.
        error: String,
    },
}

impl MonitorEvent {
    /// Dotted event type string used for webhook pattern matching.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ContainerStarted { .. } => "container.started",
            Self::ContainerStopped { .. } => "container.stopped",
            Self::ContainerUnhealthy { .. } => "container.unhealthy",
            Self::EndpointDown { .. } => "endpoint.down",
            Self::EndpointUp { .. } => "endpoint.up",
            Self::ImageStale { .. } => "image.stale",
            Self::BackupCompleted { .. } => "backup.completed",
            Self::BackupFailed { .. } => "backup.failed",
        }
    }
}

/// Typed publish/subscribe bus over [`MonitorEvent`].
///
/// Thin wrapper around a tokio broadcast channel. Publishing never
/// blocks; slow subscribers lag and drop the oldest events rather than
/// back-pressuring producers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    /// Creates a new bus with the default buffer capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Returns the number of subscribers that received it. An event with
    /// no subscribers is dropped silently; that is not an error.
    pub fn publish(&self, event: MonitorEvent) -> usize {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(event_type, receivers, "published monitoring event");
                receivers
            },
            Err(_) => 0,
        }
    }

    /// Registers a new subscriber receiving every event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped_event() -> MonitorEvent {
        MonitorEvent::ContainerStopped {
            endpoint_id: EndpointId(1),
            container_id: "abc123".to_string(),
            container_name: "web".to_string(),
            exit_code: Some(137),
        }
    }

    #[test]
    fn event_types_are_dotted_and_stable() {
        assert_eq!(stopped_event().event_type(), "container.stopped");
        assert_eq!(
            MonitorEvent::EndpointDown { endpoint_id: EndpointId(2), name: "prod".into() }
                .event_type(),
            "endpoint.down"
        );
        assert_eq!(
            MonitorEvent::BackupCompleted { path: "/tmp/b.json".into() }.event_type(),
            "backup.completed"
        );
    }

    #[test]
    fn payload_serializes_to_plain_fields() {
        let value = serde_json::to_value(stopped_event()).unwrap();
        assert_eq!(value["container_name"], "web");
        assert_eq!(value["exit_code"], 137);
        // Untagged: no variant name wrapper in the payload.
        assert!(value.get("ContainerStopped").is_none());
    }

    #[tokio::test]
    async fn bus_delivers_to_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let receivers = bus.publish(stopped_event());
        assert_eq!(receivers, 2);

        assert_eq!(rx1.recv().await.unwrap().event_type(), "container.stopped");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "container.stopped");
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(stopped_event()), 0);
    }
}
