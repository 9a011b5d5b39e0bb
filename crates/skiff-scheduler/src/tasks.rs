//! The standard periodic task set.
//!
//! Task bodies return `anyhow::Result<()>`; the runtime wrapper logs and
//! swallows errors so one failing tick never stops a timer. Components
//! that already capture their own failures (the collector, the sweeper)
//! always return `Ok`.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use skiff_collector::{Collector, ContainerApi};
use skiff_core::{
    models::{DeliveryStatus, KpiSnapshot},
    storage::Storage,
    Clock, EventBus, MonitorEvent,
};
use skiff_delivery::{DeliveryStats, RetrySweeper};
use tracing::{debug, info, warn};

use crate::runtime::Scheduler;

/// Terminal deliveries older than this are purged by cleanup.
const DELIVERY_RETENTION_DAYS: i64 = 30;

/// Intervals and toggles for the standard tasks.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Whether metrics collection runs at all.
    pub collection_enabled: bool,
    /// Interval between collection cycles.
    pub collection_interval: Duration,
    /// Whether webhook dispatch and retries run at all.
    pub webhooks_enabled: bool,
    /// Interval between retry sweeps.
    pub retry_sweep_interval: Duration,
    /// Interval between KPI snapshots.
    pub kpi_interval: Duration,
    /// Interval between image staleness scans.
    pub staleness_interval: Duration,
    /// Image age, in days, beyond which a container counts as stale.
    pub image_stale_after_days: u32,
    /// Interval between configuration backups.
    pub backup_interval: Duration,
    /// Directory receiving backup documents.
    pub backup_dir: PathBuf,
    /// Interval between cleanup runs.
    pub cleanup_interval: Duration,
    /// Metric retention window in days.
    pub metrics_retention_days: u32,
    /// Interval between coarse health log lines.
    pub health_log_interval: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            collection_enabled: true,
            collection_interval: Duration::from_secs(60),
            webhooks_enabled: true,
            retry_sweep_interval: Duration::from_secs(30),
            kpi_interval: Duration::from_secs(300),
            staleness_interval: Duration::from_secs(6 * 3600),
            image_stale_after_days: 90,
            backup_interval: Duration::from_secs(24 * 3600),
            backup_dir: PathBuf::from("backups"),
            cleanup_interval: Duration::from_secs(24 * 3600),
            metrics_retention_days: 7,
            health_log_interval: Duration::from_secs(600),
        }
    }
}

/// Shared component handles for the standard tasks.
pub struct TaskContext {
    /// Repository container.
    pub storage: Arc<Storage>,
    /// Upstream orchestration API.
    pub api: Arc<dyn ContainerApi>,
    /// Metrics collector.
    pub collector: Arc<Collector>,
    /// Delivery retry sweeper.
    pub sweeper: Arc<RetrySweeper>,
    /// Monitoring event bus.
    pub bus: EventBus,
    /// Delivery counters for the health log.
    pub stats: Arc<DeliveryStats>,
    /// Clock for timestamps.
    pub clock: Arc<dyn Clock>,
    /// Task configuration.
    pub config: TaskConfig,
}

/// Registers every standard task on the scheduler per configuration.
pub fn register_standard_tasks(scheduler: &mut Scheduler, ctx: Arc<TaskContext>) {
    if ctx.config.collection_enabled {
        let collector = ctx.collector.clone();
        scheduler.register("metrics-collection", ctx.config.collection_interval, move || {
            let collector = collector.clone();
            async move {
                // The cycle captures its own failures.
                collector.run_cycle().await;
                Ok(())
            }
        });
    }

    if ctx.config.webhooks_enabled {
        let sweeper = ctx.sweeper.clone();
        scheduler.register("webhook-retry-sweep", ctx.config.retry_sweep_interval, move || {
            let sweeper = sweeper.clone();
            async move {
                sweeper.sweep().await;
                Ok(())
            }
        });
    }

    {
        let task_ctx = ctx.clone();
        scheduler.register("kpi-snapshot", ctx.config.kpi_interval, move || {
            let ctx = task_ctx.clone();
            async move { kpi_snapshot(&ctx).await }
        });
    }

    {
        let task_ctx = ctx.clone();
        scheduler.register("image-staleness", ctx.config.staleness_interval, move || {
            let ctx = task_ctx.clone();
            async move { image_staleness_scan(&ctx).await }
        });
    }

    {
        let task_ctx = ctx.clone();
        scheduler.register("config-backup", ctx.config.backup_interval, move || {
            let ctx = task_ctx.clone();
            async move { backup(&ctx).await }
        });
    }

    {
        let task_ctx = ctx.clone();
        scheduler.register("daily-cleanup", ctx.config.cleanup_interval, move || {
            let ctx = task_ctx.clone();
            async move { cleanup(&ctx).await }
        });
    }

    {
        let task_ctx = ctx.clone();
        let started = ctx.clock.now();
        scheduler.register("health-log", ctx.config.health_log_interval, move || {
            let ctx = task_ctx.clone();
            async move { health_log(&ctx, started).await }
        });
    }
}

/// Persists one fleet KPI snapshot row.
async fn kpi_snapshot(ctx: &TaskContext) -> anyhow::Result<()> {
    let endpoints = ctx.api.list_endpoints().await?;
    let endpoints_degraded = endpoints.iter().filter(|e| e.degraded).count();

    let mut containers_running = 0usize;
    for endpoint in endpoints.iter().filter(|e| e.live_stats_capable && !e.degraded) {
        match ctx.api.list_running_containers(endpoint.id).await {
            Ok(containers) => containers_running += containers.len(),
            Err(api_error) => {
                debug!(endpoint_id = %endpoint.id, error = %api_error, "KPI container count skipped endpoint");
            },
        }
    }

    let deliveries_pending = ctx.storage.deliveries.count_by_status(DeliveryStatus::Pending).await?
        + ctx.storage.deliveries.count_by_status(DeliveryStatus::Retrying).await?;
    let deliveries_failed = ctx.storage.deliveries.count_by_status(DeliveryStatus::Failed).await?;

    let snapshot = KpiSnapshot {
        recorded_at: ctx.clock.now_utc(),
        endpoints_total: i32::try_from(endpoints.len()).unwrap_or(i32::MAX),
        endpoints_degraded: i32::try_from(endpoints_degraded).unwrap_or(i32::MAX),
        containers_running: i32::try_from(containers_running).unwrap_or(i32::MAX),
        deliveries_pending,
        deliveries_failed,
    };
    ctx.storage.kpi.insert(&snapshot).await?;

    debug!(
        endpoints = snapshot.endpoints_total,
        containers = snapshot.containers_running,
        "KPI snapshot recorded"
    );
    Ok(())
}

/// Publishes an `image.stale` event per container running an old image.
async fn image_staleness_scan(ctx: &TaskContext) -> anyhow::Result<()> {
    let threshold =
        ctx.clock.now_utc() - chrono::Duration::days(i64::from(ctx.config.image_stale_after_days));
    let endpoints = ctx.api.list_endpoints().await?;

    let mut stale = 0usize;
    for endpoint in endpoints.iter().filter(|e| e.live_stats_capable && !e.degraded) {
        let containers = match ctx.api.list_running_containers(endpoint.id).await {
            Ok(containers) => containers,
            Err(api_error) => {
                debug!(endpoint_id = %endpoint.id, error = %api_error, "staleness scan skipped endpoint");
                continue;
            },
        };

        for container in containers {
            let Some(created_at) = container.image_created_at else { continue };
            if created_at < threshold {
                stale += 1;
                let age_days = (ctx.clock.now_utc() - created_at).num_days();
                ctx.bus.publish(MonitorEvent::ImageStale {
                    endpoint_id: endpoint.id,
                    container_name: container.name,
                    image: container.image,
                    age_days,
                });
            }
        }
    }

    if stale > 0 {
        warn!(stale, threshold_days = ctx.config.image_stale_after_days, "containers running stale images");
    }
    Ok(())
}

/// Exports the webhook configuration as a timestamped JSON document.
async fn backup(ctx: &TaskContext) -> anyhow::Result<()> {
    match write_backup(ctx).await {
        Ok(path) => {
            ctx.bus.publish(MonitorEvent::BackupCompleted { path });
            Ok(())
        },
        Err(backup_error) => {
            ctx.bus.publish(MonitorEvent::BackupFailed { error: backup_error.to_string() });
            Err(backup_error)
        },
    }
}

async fn write_backup(ctx: &TaskContext) -> anyhow::Result<String> {
    let webhooks = ctx.storage.webhooks.list_all().await?;
    let webhook_count = webhooks.len();
    let now = ctx.clock.now_utc();

    let document = serde_json::json!({
        "created_at": now,
        "webhooks": webhooks,
    });

    let filename = format!("skiff-backup-{}.json", now.format("%Y%m%dT%H%M%SZ"));
    let path = ctx.config.backup_dir.join(filename);

    tokio::fs::create_dir_all(&ctx.config.backup_dir).await?;
    tokio::fs::write(&path, serde_json::to_vec_pretty(&document)?).await?;

    let path = path.display().to_string();
    info!(path = %path, webhooks = webhook_count, "configuration backup written");
    Ok(path)
}

/// Purges aged metric samples and terminal deliveries.
async fn cleanup(ctx: &TaskContext) -> anyhow::Result<()> {
    let now = ctx.clock.now_utc();

    let metrics_cutoff =
        now - chrono::Duration::days(i64::from(ctx.config.metrics_retention_days));
    let removed_metrics = ctx.storage.metrics.purge_older_than(metrics_cutoff).await?;

    let delivery_cutoff = now - chrono::Duration::days(DELIVERY_RETENTION_DAYS);
    let removed_deliveries =
        ctx.storage.deliveries.purge_terminal_older_than(delivery_cutoff).await?;

    info!(removed_metrics, removed_deliveries, "cleanup complete");
    Ok(())
}

/// Coarse periodic health line: uptime, delivery counters, database
/// reachability, and process memory.
async fn health_log(ctx: &TaskContext, started: Instant) -> anyhow::Result<()> {
    let (dispatched, delivered, retried, failed) = ctx.stats.snapshot();
    let db_healthy = ctx.storage.health_check().await.is_ok();

    info!(
        uptime_secs = ctx.clock.now().duration_since(started).as_secs(),
        dispatched,
        delivered,
        retried,
        failed,
        db_healthy,
        rss_kib = resident_memory_kib(),
        "orchestrator health"
    );
    Ok(())
}

/// Resident set size from procfs, where available.
#[cfg(target_os = "linux")]
fn resident_memory_kib() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_kib() -> Option<u64> {
    None
}
