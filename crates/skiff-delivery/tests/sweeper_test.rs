//! Retry sweeper tests.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use chrono::Utc;
use skiff_core::{
    models::{Delivery, DeliveryStatus, Webhook, WebhookId},
    Clock, TestClock,
};
use skiff_delivery::{
    store::mock::MockDeliveryStore, DeliveryClient, DeliveryStats, DeliveryWorker, RetrySweeper,
};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

fn webhook_for(url: &str) -> Webhook {
    let now = Utc::now();
    Webhook {
        id: WebhookId::new(),
        name: "ops".to_string(),
        url: url.to_string(),
        secret: "secret".to_string(),
        events: vec!["*".to_string()],
        enabled: true,
        created_at: now,
        updated_at: now,
    }
}

struct Harness {
    store: Arc<MockDeliveryStore>,
    sweeper: RetrySweeper,
    clock: Arc<TestClock>,
}

fn harness() -> Harness {
    let store = Arc::new(MockDeliveryStore::new());
    let clock = Arc::new(TestClock::with_start_time(
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
    ));
    let worker = Arc::new(DeliveryWorker::new(
        store.clone(),
        Arc::new(DeliveryClient::with_defaults().unwrap()),
        clock.clone(),
        Arc::new(DeliveryStats::new()),
    ));
    let sweeper = RetrySweeper::new(store.clone(), worker, clock.clone());
    Harness { store, sweeper, clock }
}

fn retrying_delivery(webhook: &Webhook, due_at: chrono::DateTime<Utc>, attempts: i32) -> Delivery {
    let mut delivery = Delivery::pending(webhook.id, "container.stopped", "{}", Utc::now());
    delivery.status = DeliveryStatus::Retrying;
    delivery.attempts = attempts;
    delivery.next_retry_at = Some(due_at);
    delivery
}

#[tokio::test]
async fn due_deliveries_are_resubmitted() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(2)
        .mount(&server)
        .await;

    let h = harness();
    let webhook = webhook_for(&server.uri());
    let past = h.clock.now_utc() - chrono::Duration::seconds(5);

    let first = retrying_delivery(&webhook, past, 1);
    let second = retrying_delivery(&webhook, past, 2);
    h.store.add_webhook(webhook).await;
    h.store.add_delivery(first.clone()).await;
    h.store.add_delivery(second.clone()).await;

    assert_eq!(h.sweeper.sweep().await, 2);

    for id in [first.id, second.id] {
        let updated = h.store.delivery(id).await.unwrap();
        assert_eq!(updated.status, DeliveryStatus::Delivered);
    }

    server.verify().await;
}

#[tokio::test]
async fn future_retries_are_left_alone() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let webhook = webhook_for(&server.uri());
    let due = retrying_delivery(&webhook, h.clock.now_utc() - chrono::Duration::seconds(1), 1);
    let not_due =
        retrying_delivery(&webhook, h.clock.now_utc() + chrono::Duration::seconds(600), 1);
    h.store.add_webhook(webhook).await;
    h.store.add_delivery(due.clone()).await;
    h.store.add_delivery(not_due.clone()).await;

    assert_eq!(h.sweeper.sweep().await, 1);

    assert_eq!(
        h.store.delivery(due.id).await.unwrap().status,
        DeliveryStatus::Delivered
    );
    let untouched = h.store.delivery(not_due.id).await.unwrap();
    assert_eq!(untouched.status, DeliveryStatus::Retrying);
    assert_eq!(untouched.attempts, 1);

    server.verify().await;
}

#[tokio::test]
async fn one_failing_delivery_does_not_stop_the_sweep() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/bad"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/good"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let h = harness();
    let bad_webhook = webhook_for(&format!("{}/bad", server.uri()));
    let good_webhook = webhook_for(&format!("{}/good", server.uri()));
    let past = h.clock.now_utc() - chrono::Duration::seconds(5);

    let failing = retrying_delivery(&bad_webhook, past, 1);
    let succeeding = retrying_delivery(&good_webhook, past, 1);
    h.store.add_webhook(bad_webhook).await;
    h.store.add_webhook(good_webhook).await;
    h.store.add_delivery(failing.clone()).await;
    h.store.add_delivery(succeeding.clone()).await;

    assert_eq!(h.sweeper.sweep().await, 2);

    let failed_again = h.store.delivery(failing.id).await.unwrap();
    assert_eq!(failed_again.status, DeliveryStatus::Retrying);
    assert_eq!(failed_again.attempts, 2);

    assert_eq!(
        h.store.delivery(succeeding.id).await.unwrap().status,
        DeliveryStatus::Delivered
    );
}

#[tokio::test]
async fn sweep_is_bounded_to_batch_size() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let h = harness();
    let webhook = webhook_for(&server.uri());
    let past = h.clock.now_utc() - chrono::Duration::seconds(5);

    for _ in 0..60 {
        h.store.add_delivery(retrying_delivery(&webhook, past, 1)).await;
    }
    h.store.add_webhook(webhook).await;

    assert_eq!(h.sweeper.sweep().await, 50);
}

#[tokio::test]
async fn empty_sweep_is_a_noop() {
    let h = harness();
    assert_eq!(h.sweeper.sweep().await, 0);
}
