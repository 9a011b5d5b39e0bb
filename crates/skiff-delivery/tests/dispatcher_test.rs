//! Dispatcher matching and fan-out tests.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use chrono::Utc;
use skiff_core::{
    models::{DeliveryStatus, EndpointId, Webhook, WebhookId},
    MonitorEvent, TestClock,
};
use skiff_delivery::{
    store::mock::MockDeliveryStore, DeliveryClient, DeliveryPool, DeliveryStats, DeliveryWorker,
    Dispatcher,
};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

fn webhook_with_patterns(name: &str, url: &str, patterns: &[&str], enabled: bool) -> Webhook {
    let now = Utc::now();
    Webhook {
        id: WebhookId::new(),
        name: name.to_string(),
        url: url.to_string(),
        secret: "secret".to_string(),
        events: patterns.iter().map(ToString::to_string).collect(),
        enabled,
        created_at: now,
        updated_at: now,
    }
}

fn stopped_event() -> MonitorEvent {
    MonitorEvent::ContainerStopped {
        endpoint_id: EndpointId(1),
        container_id: "abc".to_string(),
        container_name: "web".to_string(),
        exit_code: Some(1),
    }
}

struct Harness {
    store: Arc<MockDeliveryStore>,
    dispatcher: Dispatcher,
    pool: Arc<DeliveryPool>,
}

fn harness() -> Harness {
    let store = Arc::new(MockDeliveryStore::new());
    let clock = Arc::new(TestClock::with_start_time(
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
    ));
    let stats = Arc::new(DeliveryStats::new());
    let worker = Arc::new(DeliveryWorker::new(
        store.clone(),
        Arc::new(DeliveryClient::with_defaults().unwrap()),
        clock.clone(),
        stats.clone(),
    ));
    let pool = Arc::new(DeliveryPool::spawn(worker, 2, 64));
    let dispatcher = Dispatcher::new(store.clone(), pool.clone(), clock, stats);
    Harness { store, dispatcher, pool }
}

#[tokio::test]
async fn only_subscribed_webhooks_get_deliveries() {
    let h = harness();

    let prefix = webhook_with_patterns("prefix", "http://127.0.0.1:1/a", &["container.*"], true);
    let all = webhook_with_patterns("all", "http://127.0.0.1:1/b", &["*"], true);
    let other = webhook_with_patterns("other", "http://127.0.0.1:1/c", &["endpoint.down"], true);
    let disabled = webhook_with_patterns("disabled", "http://127.0.0.1:1/d", &["*"], false);

    let matched_ids = [prefix.id, all.id];
    for webhook in [prefix, all, other, disabled] {
        h.store.add_webhook(webhook).await;
    }

    h.dispatcher.dispatch(&stopped_event()).await;

    let deliveries = h.store.all_deliveries().await;
    assert_eq!(deliveries.len(), 2);
    for delivery in &deliveries {
        assert!(matched_ids.contains(&delivery.webhook_id));
        assert_eq!(delivery.event_type, "container.stopped");
        assert_eq!(delivery.max_attempts, 5);
    }

    h.pool.shutdown().await;
}

#[tokio::test]
async fn payload_is_the_serialized_event() {
    let h = harness();
    h.store
        .add_webhook(webhook_with_patterns("all", "http://127.0.0.1:1/a", &["*"], true))
        .await;

    let event = stopped_event();
    h.dispatcher.dispatch(&event).await;

    let deliveries = h.store.all_deliveries().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].payload, serde_json::to_string(&event).unwrap());

    let parsed: serde_json::Value = serde_json::from_str(&deliveries[0].payload).unwrap();
    assert_eq!(parsed["container_name"], "web");

    h.pool.shutdown().await;
}

#[tokio::test]
async fn webhook_listing_failure_aborts_dispatch() {
    let h = harness();
    h.store
        .add_webhook(webhook_with_patterns("all", "http://127.0.0.1:1/a", &["*"], true))
        .await;
    h.store.inject_list_error("connection reset").await;

    h.dispatcher.dispatch(&stopped_event()).await;

    assert!(h.store.all_deliveries().await.is_empty());

    h.pool.shutdown().await;
}

#[tokio::test]
async fn unmatched_event_creates_nothing() {
    let h = harness();
    h.store
        .add_webhook(webhook_with_patterns("ep", "http://127.0.0.1:1/a", &["endpoint.*"], true))
        .await;

    h.dispatcher.dispatch(&stopped_event()).await;

    assert!(h.store.all_deliveries().await.is_empty());

    h.pool.shutdown().await;
}

#[tokio::test]
async fn dispatched_deliveries_are_attempted_asynchronously() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    h.store
        .add_webhook(webhook_with_patterns("ops", &server.uri(), &["container.*"], true))
        .await;

    h.dispatcher.dispatch(&stopped_event()).await;

    // The hand-off is asynchronous; poll until the pool worker lands the
    // terminal state.
    let mut delivered = false;
    for _ in 0..100 {
        let deliveries = h.store.all_deliveries().await;
        if deliveries.first().is_some_and(|d| d.status == DeliveryStatus::Delivered) {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(delivered, "delivery should reach delivered state via the pool");

    h.pool.shutdown().await;
    server.verify().await;
}
