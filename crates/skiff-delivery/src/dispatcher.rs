//! Event-to-webhook dispatch.
//!
//! On each monitoring event, the dispatcher takes a fresh snapshot of
//! enabled webhooks, matches the event type against their subscription
//! patterns, creates the matched deliveries in one transaction, and
//! hands them to the dispatch pool. It never waits for delivery
//! completion and never surfaces failures to the event producer.

use std::sync::{atomic::Ordering, Arc};

use skiff_core::{
    models::{Delivery, Webhook},
    Clock, MonitorEvent,
};
use tracing::{debug, error};

use crate::{pool::DeliveryPool, store::DeliveryStore, worker::DeliveryStats};

/// Matches one subscription pattern against a dotted event type.
///
/// `*` matches any event; `prefix.*` matches any type starting with
/// `prefix.`; anything else matches only on exact equality.
pub fn pattern_matches(pattern: &str, event_type: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix(".*") {
        return event_type
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'));
    }

    pattern == event_type
}

/// Whether a webhook subscribes to an event type via any of its patterns.
pub fn webhook_matches(webhook: &Webhook, event_type: &str) -> bool {
    webhook.events.iter().any(|pattern| pattern_matches(pattern, event_type))
}

/// Matches events against webhook subscriptions and creates deliveries.
pub struct Dispatcher {
    store: Arc<dyn DeliveryStore>,
    pool: Arc<DeliveryPool>,
    clock: Arc<dyn Clock>,
    stats: Arc<DeliveryStats>,
}

impl Dispatcher {
    /// Creates a new dispatcher.
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        pool: Arc<DeliveryPool>,
        clock: Arc<dyn Clock>,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        Self { store, pool, clock, stats }
    }

    /// Dispatches one event to every subscribed webhook.
    ///
    /// A failure to list webhooks aborts dispatch of this event entirely;
    /// the producer is never told. Individual delivery outcomes land on
    /// their delivery rows asynchronously.
    pub async fn dispatch(&self, event: &MonitorEvent) {
        let event_type = event.event_type();

        let webhooks = match self.store.list_enabled_webhooks().await {
            Ok(webhooks) => webhooks,
            Err(db_error) => {
                error!(event_type, error = %db_error, "failed to list webhooks, dropping event");
                return;
            },
        };

        let matched: Vec<&Webhook> =
            webhooks.iter().filter(|w| webhook_matches(w, event_type)).collect();

        if matched.is_empty() {
            debug!(event_type, "no webhook subscribed");
            return;
        }

        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(serialize_error) => {
                error!(event_type, error = %serialize_error, "failed to serialize event payload");
                return;
            },
        };

        let now = self.clock.now_utc();
        let deliveries: Vec<Delivery> = matched
            .iter()
            .map(|webhook| Delivery::pending(webhook.id, event_type, payload.clone(), now))
            .collect();

        if let Err(db_error) = self.store.create_deliveries(&deliveries).await {
            error!(event_type, error = %db_error, "failed to create deliveries, dropping event");
            return;
        }

        self.stats.dispatched.fetch_add(deliveries.len() as u64, Ordering::Relaxed);

        for delivery in &deliveries {
            self.pool.submit(delivery.id).await;
        }

        debug!(event_type, webhooks = deliveries.len(), "event dispatched");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_everything() {
        assert!(pattern_matches("*", "container.stopped"));
        assert!(pattern_matches("*", "endpoint.down"));
        assert!(pattern_matches("*", "anything"));
    }

    #[test]
    fn prefix_pattern_matches_own_namespace_only() {
        assert!(pattern_matches("container.*", "container.stopped"));
        assert!(pattern_matches("container.*", "container.started"));

        assert!(!pattern_matches("container.*", "container"));
        assert!(!pattern_matches("container.*", "stack.container.stopped"));
        assert!(!pattern_matches("container.*", "containers.stopped"));
    }

    #[test]
    fn other_patterns_require_exact_equality() {
        assert!(pattern_matches("container.stopped", "container.stopped"));
        assert!(!pattern_matches("container.stopped", "container.started"));
        assert!(!pattern_matches("container.stopped", "container.stopped.hard"));
    }
}
