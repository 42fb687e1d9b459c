//! Bounded retry policy for asynchronous instrument completions.
//!
//! Instruments do not notify when a distance is ready; callers re-read until
//! the awaited field shows up. [`RetryPolicy`] captures the ceiling and the
//! fixed delay, and [`Polled`] reports how a poll ended.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// Defines a policy for polling an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// The maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// The delay between attempts.
    #[serde(with = "millis")]
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            backoff_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff_delay,
        }
    }

    /// Policy that tries once and never waits.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Wait between two attempts.
    pub async fn pause(&self) {
        if !self.backoff_delay.is_zero() {
            sleep(self.backoff_delay).await;
        }
    }

    /// True while another attempt is allowed after `attempts` have run.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts.max(1)
    }
}

/// Outcome of a bounded poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Polled<T> {
    /// Last value read
    pub value: T,
    /// Attempts used, the first one included
    pub attempts: u32,
    /// Whether the awaited condition held on the last attempt
    pub satisfied: bool,
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 20);
        assert_eq!(policy.backoff_delay, Duration::from_secs(2));
        assert!(policy.allows(19));
        assert!(!policy.allows(20));
    }

    #[test]
    fn test_zero_ceiling_still_runs_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert!(policy.allows(0));
        assert!(!policy.allows(1));
        assert!(!RetryPolicy::once().allows(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_waits_the_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        let start = tokio::time::Instant::now();
        policy.pause().await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
