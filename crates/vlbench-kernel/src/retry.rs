//! Retry policy for calls that cross a remote boundary
//!
//! Fixed number of attempts with a fixed delay between them. There is no
//! jitter and no exponential growth.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Attempts in the reference policy
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay between attempts in the reference policy
pub const DEFAULT_DELAY: Duration = Duration::from_secs(30);

/// Fixed-attempt, fixed-delay retry contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay slept between two consecutive attempts
    #[serde(with = "delay_secs", rename = "delay_secs")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// A single attempt, no delay
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Attempts actually made; a zero setting still makes one
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

mod delay_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(delay.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|e| {
            serde::de::Error::custom(format!("delay_secs must be a non-negative number: {}", e))
        })
    }
}

/// Blocks between retry attempts
///
/// Injected so that the delay is observable in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(30));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).effective_attempts(), 1);
    }

    #[test]
    fn deserializes_delay_in_seconds() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_attempts": 3, "delay_secs": 1.5}"#).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_millis(1500));
    }

    #[test]
    fn rejects_negative_and_overflowing_delays() {
        for delay in ["-1", "1e30"] {
            let json = format!(r#"{{"max_attempts": 3, "delay_secs": {}}}"#, delay);
            let err = serde_json::from_str::<RetryPolicy>(&json).unwrap_err();
            assert!(err.to_string().contains("delay_secs"), "{}: {}", delay, err);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_waits_for_the_delay() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(30)).await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
