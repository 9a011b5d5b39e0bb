//! In-memory network throughput tracker.
//!
//! Collection cycles feed cumulative rx/tx byte counters here; the
//! tracker turns successive observations into bytes-per-second rates.
//! Pure bookkeeping: nothing is persisted, and a restart just loses the
//! first delta.

use std::{collections::HashMap, sync::Mutex, time::Instant};

/// Computed throughput for one container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkRate {
    /// Receive rate in bytes per second.
    pub rx_bytes_per_sec: f64,
    /// Transmit rate in bytes per second.
    pub tx_bytes_per_sec: f64,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    rx_bytes: u64,
    tx_bytes: u64,
    at: Instant,
    rate: Option<NetworkRate>,
}

/// Tracks rx/tx deltas over time per container.
#[derive(Debug, Default)]
pub struct NetworkRateTracker {
    state: Mutex<HashMap<String, Observation>>,
}

impl NetworkRateTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observation and returns the rate since the previous
    /// one, when there is a usable previous observation.
    pub fn observe(
        &self,
        container_id: &str,
        rx_bytes: u64,
        tx_bytes: u64,
        at: Instant,
    ) -> Option<NetworkRate> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous = state.get(container_id).copied();
        let rate = previous.and_then(|prev| {
            let elapsed = at.saturating_duration_since(prev.at).as_secs_f64();
            if elapsed <= 0.0 {
                return None;
            }
            Some(NetworkRate {
                rx_bytes_per_sec: rx_bytes.saturating_sub(prev.rx_bytes) as f64 / elapsed,
                tx_bytes_per_sec: tx_bytes.saturating_sub(prev.tx_bytes) as f64 / elapsed,
            })
        });

        state.insert(container_id.to_string(), Observation { rx_bytes, tx_bytes, at, rate });

        rate
    }

    /// Last computed rate for a container, if any.
    pub fn current(&self, container_id: &str) -> Option<NetworkRate> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(container_id)
            .and_then(|obs| obs.rate)
    }

    /// Drops state for containers no longer observed.
    pub fn retain(&self, live_container_ids: &[&str]) {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|id, _| live_container_ids.contains(&id.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn first_observation_yields_no_rate() {
        let tracker = NetworkRateTracker::new();
        let now = Instant::now();

        assert!(tracker.observe("c1", 1000, 500, now).is_none());
        assert!(tracker.current("c1").is_none());
    }

    #[test]
    fn rate_is_delta_over_elapsed_time() {
        let tracker = NetworkRateTracker::new();
        let start = Instant::now();

        tracker.observe("c1", 1000, 500, start);
        let rate = tracker
            .observe("c1", 3000, 1500, start + Duration::from_secs(10))
            .expect("second observation yields a rate");

        assert!((rate.rx_bytes_per_sec - 200.0).abs() < f64::EPSILON);
        assert!((rate.tx_bytes_per_sec - 100.0).abs() < f64::EPSILON);
        assert_eq!(tracker.current("c1"), Some(rate));
    }

    #[test]
    fn counter_reset_reads_as_zero_not_negative() {
        let tracker = NetworkRateTracker::new();
        let start = Instant::now();

        tracker.observe("c1", 5000, 5000, start);
        let rate = tracker.observe("c1", 100, 100, start + Duration::from_secs(5)).unwrap();

        // Container restarted and its counters reset; saturating delta
        // keeps the rate at zero.
        assert_eq!(rate.rx_bytes_per_sec, 0.0);
        assert_eq!(rate.tx_bytes_per_sec, 0.0);
    }

    #[test]
    fn same_instant_observation_yields_no_rate() {
        let tracker = NetworkRateTracker::new();
        let now = Instant::now();

        tracker.observe("c1", 100, 100, now);
        assert!(tracker.observe("c1", 200, 200, now).is_none());
    }

    #[test]
    fn retain_drops_stale_containers() {
        let tracker = NetworkRateTracker::new();
        let now = Instant::now();

        tracker.observe("gone", 1, 1, now);
        tracker.observe("kept", 1, 1, now);
        tracker.observe("kept", 2, 2, now + Duration::from_secs(1));

        tracker.retain(&["kept"]);

        assert!(tracker.current("kept").is_some());
        assert!(tracker.current("gone").is_none());
    }
}
