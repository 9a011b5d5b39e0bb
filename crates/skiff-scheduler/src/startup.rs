//! Startup sequencing: upstream connectivity probe and cache warm-up.
//!
//! Both steps run before any timer starts. Neither is fatal: an
//! unreachable upstream puts the system in degraded mode where timers
//! still start and individual cycles fail and log until connectivity
//! returns.

use std::time::Duration;

use skiff_collector::ContainerApi;
use skiff_core::Clock;
use tracing::{debug, info, warn};

/// Reachability probe attempts before giving up.
pub const CONNECT_ATTEMPTS: u32 = 10;

/// Fixed delay between probe attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Probes the upstream API, retrying on a fixed schedule.
///
/// Returns whether the upstream was reachable. `false` means degraded
/// mode: the caller starts timers anyway.
pub async fn verify_upstream(api: &dyn ContainerApi, clock: &dyn Clock) -> bool {
    for attempt in 1..=CONNECT_ATTEMPTS {
        match api.ping().await {
            Ok(()) => {
                info!(attempt, "upstream API reachable");
                return true;
            },
            Err(api_error) => {
                warn!(
                    attempt,
                    max_attempts = CONNECT_ATTEMPTS,
                    error = %api_error,
                    "upstream API unreachable"
                );
                if attempt < CONNECT_ATTEMPTS {
                    clock.sleep(CONNECT_RETRY_DELAY).await;
                }
            },
        }
    }

    warn!(
        attempts = CONNECT_ATTEMPTS,
        "upstream API unreachable, starting in degraded mode; cycles will fail until connectivity returns"
    );
    false
}

/// Best-effort cache warm-up: prefetch endpoint and container lists so
/// the first real cycle does not pay for a cold upstream cache.
///
/// Failures are logged and never fatal.
pub async fn warm_cache(api: &dyn ContainerApi) {
    let endpoints = match api.list_endpoints().await {
        Ok(endpoints) => endpoints,
        Err(api_error) => {
            warn!(error = %api_error, "cache warm-up failed to list endpoints");
            return;
        },
    };

    let mut containers = 0usize;
    for endpoint in endpoints.iter().filter(|e| e.live_stats_capable && !e.degraded) {
        match api.list_running_containers(endpoint.id).await {
            Ok(listed) => containers += listed.len(),
            Err(api_error) => {
                debug!(
                    endpoint_id = %endpoint.id,
                    error = %api_error,
                    "cache warm-up failed for endpoint"
                );
            },
        }
    }

    debug!(endpoints = endpoints.len(), containers, "cache warm-up complete");
}
