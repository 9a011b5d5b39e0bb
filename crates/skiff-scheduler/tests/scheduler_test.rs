//! Scheduler runtime and startup sequencing tests.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

use chrono::Utc;
use skiff_collector::api::mock::MockContainerApi;
use skiff_core::{
    models::{DeliveryStatus, EndpointId, Webhook, WebhookId},
    EventBus, MonitorEvent, TestClock,
};
use skiff_delivery::{
    store::mock::MockDeliveryStore, DeliveryClient, DeliveryPool, DeliveryStats, DeliveryWorker,
    Dispatcher,
};
use skiff_scheduler::{verify_upstream, warm_cache, Scheduler};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn shutdown_twice_is_safe_and_leaves_no_active_tasks() {
    let mut scheduler = Scheduler::new();
    let ticks = Arc::new(AtomicU64::new(0));

    let counter = ticks.clone();
    scheduler.register("counter", Duration::from_millis(10), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    });

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(ticks.load(Ordering::Relaxed) > 0, "task should have fired");

    scheduler.shutdown().await;
    assert_eq!(scheduler.active_tasks(), 0);

    // Second shutdown is a no-op, never a panic.
    scheduler.shutdown().await;
    assert_eq!(scheduler.active_tasks(), 0);
}

#[tokio::test]
async fn tasks_stop_firing_after_shutdown() {
    let mut scheduler = Scheduler::new();
    let ticks = Arc::new(AtomicU64::new(0));

    let counter = ticks.clone();
    scheduler.register("counter", Duration::from_millis(10), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    });

    tokio::time::sleep(Duration::from_millis(40)).await;
    scheduler.shutdown().await;

    let after_shutdown = ticks.load(Ordering::Relaxed);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ticks.load(Ordering::Relaxed), after_shutdown);
}

#[tokio::test]
async fn failing_task_keeps_its_schedule_and_spares_siblings() {
    let mut scheduler = Scheduler::new();
    let failing_ticks = Arc::new(AtomicU64::new(0));
    let healthy_ticks = Arc::new(AtomicU64::new(0));

    let counter = failing_ticks.clone();
    scheduler.register("always-fails", Duration::from_millis(10), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::Relaxed);
            anyhow::bail!("tick blew up");
        }
    });

    let counter = healthy_ticks.clone();
    scheduler.register("healthy", Duration::from_millis(10), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    });

    tokio::time::sleep(Duration::from_millis(80)).await;
    scheduler.shutdown().await;

    // The failing task kept firing on schedule, and its errors never
    // reached the healthy one.
    assert!(failing_ticks.load(Ordering::Relaxed) >= 2);
    assert!(healthy_ticks.load(Ordering::Relaxed) >= 2);
}

#[tokio::test]
async fn first_tick_waits_one_full_interval() {
    let mut scheduler = Scheduler::new();
    let ticks = Arc::new(AtomicU64::new(0));

    let counter = ticks.clone();
    scheduler.register("slow", Duration::from_millis(200), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ticks.load(Ordering::Relaxed), 0, "no tick before one interval elapses");

    scheduler.shutdown().await;
}

fn catch_all_webhook(url: &str) -> Webhook {
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

#[tokio::test]
async fn listener_routes_bus_events_into_deliveries_until_shutdown() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = Arc::new(MockDeliveryStore::new());
    store.add_webhook(catch_all_webhook(&server.uri())).await;

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
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), pool.clone(), clock, stats));

    let bus = EventBus::new();
    let mut scheduler = Scheduler::new();
    scheduler.attach_listener(&bus, dispatcher);
    scheduler.attach_pool(pool);

    bus.publish(MonitorEvent::ContainerStopped {
        endpoint_id: EndpointId(1),
        container_id: "abc".to_string(),
        container_name: "web".to_string(),
        exit_code: Some(0),
    });

    let mut delivered = false;
    for _ in 0..100 {
        if store
            .all_deliveries()
            .await
            .first()
            .is_some_and(|d| d.status == DeliveryStatus::Delivered)
        {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(delivered, "bus event should flow through the listener into a delivery");

    scheduler.shutdown().await;
    assert_eq!(scheduler.active_tasks(), 0);

    // The subscription is gone: later events create nothing.
    let before = store.all_deliveries().await.len();
    bus.publish(MonitorEvent::ContainerStopped {
        endpoint_id: EndpointId(1),
        container_id: "def".to_string(),
        container_name: "db".to_string(),
        exit_code: None,
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.all_deliveries().await.len(), before);
}

#[tokio::test]
async fn upstream_probe_retries_until_reachable() {
    let api = MockContainerApi::new();
    api.fail_pings(3);
    let clock = TestClock::new();

    let reachable = verify_upstream(&api, &clock).await;

    assert!(reachable);
    assert_eq!(api.calls.ping.load(Ordering::Relaxed), 4);
    // Three failures means three fixed 2s waits on the virtual clock.
    assert_eq!(clock.elapsed(), Duration::from_secs(6));
}

#[tokio::test]
async fn upstream_probe_gives_up_after_the_attempt_budget() {
    let api = MockContainerApi::new();
    api.fail_pings(u32::MAX);
    let clock = TestClock::new();

    let reachable = verify_upstream(&api, &clock).await;

    assert!(!reachable);
    assert_eq!(api.calls.ping.load(Ordering::Relaxed), 10);
}

#[tokio::test]
async fn cache_warm_up_failures_are_not_fatal() {
    let api = MockContainerApi::new();
    api.fail_list_endpoints();

    // Must not panic or error.
    warm_cache(&api).await;
}
