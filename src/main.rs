//! Skiff background orchestrator.
//!
//! Main entry point: initializes tracing and storage, wires the
//! collector, webhook delivery engine, and scheduler together, and
//! coordinates graceful startup and shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use skiff_collector::{
    api::http::HttpContainerApi, sink::PostgresMetricSink, Collector, NetworkRateTracker,
};
use skiff_core::{storage::Storage, EventBus, RealClock};
use skiff_delivery::{
    store::PostgresDeliveryStore, DeliveryClient, DeliveryPool, DeliveryStats, DeliveryWorker,
    Dispatcher, RetrySweeper, DEFAULT_POOL_QUEUE,
};
use skiff_scheduler::{
    register_standard_tasks, verify_upstream, warm_cache, Scheduler, TaskContext,
};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

mod config;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log);

    info!("starting skiff orchestrator");
    info!(
        database_url = %config.database_url_masked(),
        upstream_url = %config.upstream_url,
        "configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    run_migrations(&db_pool).await?;
    info!("database ready");

    let storage = Arc::new(Storage::new(db_pool.clone()));
    let clock = Arc::new(RealClock::new());
    let bus = EventBus::new();

    let api = Arc::new(
        HttpContainerApi::new(&config.upstream_url, &config.upstream_api_key)
            .context("failed to build upstream API client")?,
    );

    // Delivery engine.
    let stats = Arc::new(DeliveryStats::new());
    let delivery_store = Arc::new(PostgresDeliveryStore::new(storage.clone()));
    let worker = Arc::new(DeliveryWorker::new(
        delivery_store.clone(),
        Arc::new(DeliveryClient::with_defaults()?),
        clock.clone(),
        stats.clone(),
    ));
    let pool = Arc::new(DeliveryPool::spawn(
        worker.clone(),
        config.delivery_pool_workers,
        DEFAULT_POOL_QUEUE,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        delivery_store.clone(),
        pool.clone(),
        clock.clone(),
        stats.clone(),
    ));
    let sweeper = Arc::new(RetrySweeper::new(delivery_store, worker, clock.clone()));

    // Metrics collection.
    let collector = Arc::new(Collector::new(
        api.clone(),
        Arc::new(PostgresMetricSink::new(storage.clone())),
        Arc::new(NetworkRateTracker::new()),
        clock.clone(),
        config.to_collector_config(),
    ));

    // Startup sequencing: probe the upstream and warm its caches before
    // any timer starts. Neither step is fatal.
    verify_upstream(api.as_ref(), clock.as_ref()).await;
    warm_cache(api.as_ref()).await;

    let mut scheduler = Scheduler::new();
    if config.webhooks_enabled {
        scheduler.attach_listener(&bus, dispatcher);
    }
    scheduler.attach_pool(pool);
    register_standard_tasks(
        &mut scheduler,
        Arc::new(TaskContext {
            storage,
            api,
            collector,
            sweeper,
            bus,
            stats,
            clock,
            config: config.to_task_config(),
        }),
    );

    info!("skiff orchestrator running");

    shutdown_signal().await;
    info!("shutdown signal received, starting graceful shutdown");

    scheduler.shutdown().await;
    db_pool.close().await;

    info!("skiff shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with bounded retry.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool after retries");
            },
        }
    }
}

/// Creates tables and indexes if they do not exist.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webhooks (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            secret TEXT NOT NULL,
            events TEXT[] NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create webhooks table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deliveries (
            id UUID PRIMARY KEY,
            webhook_id UUID NOT NULL,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 5,
            next_retry_at TIMESTAMPTZ,
            response_status INTEGER,
            response_body TEXT,
            error TEXT,
            delivered_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create deliveries table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metric_samples (
            id BIGSERIAL PRIMARY KEY,
            endpoint_id BIGINT NOT NULL,
            container_id TEXT NOT NULL,
            container_name TEXT NOT NULL,
            kind TEXT NOT NULL,
            value DOUBLE PRECISION NOT NULL,
            recorded_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create metric_samples table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kpi_snapshots (
            id BIGSERIAL PRIMARY KEY,
            recorded_at TIMESTAMPTZ NOT NULL,
            endpoints_total INTEGER NOT NULL,
            endpoints_degraded INTEGER NOT NULL,
            containers_running INTEGER NOT NULL,
            deliveries_pending BIGINT NOT NULL,
            deliveries_failed BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create kpi_snapshots table")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_deliveries_due
        ON deliveries(status, next_retry_at)
        WHERE status = 'retrying'
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create deliveries due index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_deliveries_webhook
        ON deliveries(webhook_id, created_at DESC)
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create deliveries webhook index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_metric_samples_container
        ON metric_samples(endpoint_id, container_id, recorded_at DESC)
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create metric_samples container index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_metric_samples_age
        ON metric_samples(recorded_at)
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create metric_samples age index")?;

    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received CTRL+C signal");
        },
        _ = terminate => {
            info!("received SIGTERM signal");
        },
    }
}
