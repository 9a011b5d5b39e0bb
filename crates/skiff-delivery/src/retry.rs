//! Exponential backoff schedule for failed deliveries.
//!
//! The schedule is fixed: `min(10 * 3^n, 3600)` seconds, where `n` is the
//! attempt count after the failed call. Attempts 1..5 wait 30s, 90s,
//! 270s, 810s, 2430s; everything later saturates at one hour.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Backoff base multiplier in seconds.
const BASE_SECONDS: u64 = 10;

/// Upper bound on any retry delay, in seconds.
const MAX_DELAY_SECONDS: u64 = 3600;

/// Exponent clamp; beyond this the cap dominates anyway.
const MAX_EXPONENT: u32 = 12;

/// Decision for a failed delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the delivery at the specified time.
    Retry {
        /// When the next attempt should be made.
        next_attempt_at: DateTime<Utc>,
    },
    /// Do not retry; the delivery is permanently failed.
    GiveUp,
}

/// Delay before the next attempt, given the attempt count just made.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(MAX_EXPONENT);
    let seconds = BASE_SECONDS.saturating_mul(3u64.saturating_pow(exponent));
    Duration::from_secs(seconds.min(MAX_DELAY_SECONDS))
}

/// Decides whether a failed attempt gets another try.
///
/// `attempt` is the attempt count including the one that just failed;
/// `max_attempts` is the delivery's fixed budget.
pub fn decide_retry(attempt: u32, max_attempts: u32, now: DateTime<Utc>) -> RetryDecision {
    if attempt >= max_attempts {
        return RetryDecision::GiveUp;
    }

    let delay = backoff_delay(attempt);
    let chrono_delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

    RetryDecision::Retry { next_attempt_at: now + chrono_delay }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_follows_literal_formula() {
        assert_eq!(backoff_delay(1), Duration::from_secs(30));
        assert_eq!(backoff_delay(2), Duration::from_secs(90));
        assert_eq!(backoff_delay(3), Duration::from_secs(270));
        assert_eq!(backoff_delay(4), Duration::from_secs(810));
        assert_eq!(backoff_delay(5), Duration::from_secs(2430));
    }

    #[test]
    fn backoff_caps_at_one_hour() {
        // 10 * 3^6 = 7290 > 3600
        assert_eq!(backoff_delay(6), Duration::from_secs(3600));
        assert_eq!(backoff_delay(20), Duration::from_secs(3600));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_secs(3600));
    }

    #[test]
    fn retry_scheduled_while_attempts_remain() {
        let now = Utc::now();

        match decide_retry(1, 5, now) {
            RetryDecision::Retry { next_attempt_at } => {
                assert_eq!(next_attempt_at, now + chrono::Duration::seconds(30));
            },
            RetryDecision::GiveUp => unreachable!("attempt 1 of 5 must retry"),
        }

        match decide_retry(4, 5, now) {
            RetryDecision::Retry { next_attempt_at } => {
                assert_eq!(next_attempt_at, now + chrono::Duration::seconds(810));
            },
            RetryDecision::GiveUp => unreachable!("attempt 4 of 5 must retry"),
        }
    }

    #[test]
    fn exhausted_attempts_give_up() {
        let now = Utc::now();
        assert_eq!(decide_retry(5, 5, now), RetryDecision::GiveUp);
        assert_eq!(decide_retry(7, 5, now), RetryDecision::GiveUp);
    }
}
