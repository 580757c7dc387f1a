//! Bounded polling for provider-side asynchronous operations
//!
//! Gateway teardown, instance termination and network-interface release
//! complete in the background on the provider side. Every wait goes
//! through [`poll_until`], which stops after `max_attempts` probes.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Poll settings: fixed interval, bounded attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Maximum number of probes
    pub max_attempts: u32,

    /// Delay between probes
    #[serde(with = "duration_secs")]
    pub interval: Duration,
}

impl PollConfig {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Checks actually made: at least one, however the config was built
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Upper bound on the time spent sleeping
    pub fn max_wait(&self) -> Duration {
        self.interval * (self.attempts() - 1)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(10),
        }
    }
}

/// Terminal outcome of a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut {
        attempts: u32,
        waited: Duration,
        last_error: Option<String>,
    },
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }
}

/// Probe until it yields `Some`, or give up after `config.attempts()`.
///
/// A probe error counts as "not ready yet"; the last one is kept in the
/// timeout outcome.
pub async fn poll_until<T, F, Fut>(config: &PollConfig, label: &str, mut probe: F) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let mut last_error = None;
    let attempts = config.attempts();

    for attempt in 0..attempts {
        match probe().await {
            Ok(Some(value)) => {
                tracing::debug!(label, attempt, "poll ready");
                return PollOutcome::Ready(value);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(label, attempt, error = %e, "poll probe failed");
                last_error = Some(e.to_string());
            }
        }

        if attempt + 1 < attempts {
            sleep(config.interval).await;
        }
    }

    tracing::warn!(
        label,
        attempts,
        "gave up waiting after {:?}",
        config.max_wait()
    );
    PollOutcome::TimedOut {
        attempts,
        waited: config.max_wait(),
        last_error,
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;

    #[tokio::test]
    async fn test_ready_on_third_probe() {
        let config = PollConfig::new(5, Duration::ZERO);
        let mut calls = 0;

        let outcome = poll_until(&config, "test", || {
            calls += 1;
            let current = calls;
            async move { Ok(if current == 3 { Some(current) } else { None }) }
        })
        .await;

        assert_eq!(outcome, PollOutcome::Ready(3));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_times_out_after_max_attempts() {
        let config = PollConfig::new(4, Duration::ZERO);
        let mut calls = 0;

        let outcome: PollOutcome<()> = poll_until(&config, "never", || {
            calls += 1;
            async { Err(CloudError::ApiError("throttled".to_string())) }
        })
        .await;

        assert_eq!(calls, 4);
        match outcome {
            PollOutcome::TimedOut {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 4);
                assert!(last_error.unwrap().contains("throttled"));
            }
            PollOutcome::Ready(_) => panic!("expected timeout"),
        }
    }

    #[test]
    fn test_max_wait() {
        let config = PollConfig::new(6, Duration::from_secs(5));
        assert_eq!(config.max_wait(), Duration::from_secs(25));
        assert_eq!(PollConfig::new(0, Duration::from_secs(5)).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_deserialized_zero_attempts_still_checks_once() {
        let config: PollConfig = serde_json::from_str(r#"{"max_attempts": 0, "interval": 0}"#).unwrap();
        assert_eq!(config.attempts(), 1);
        assert_eq!(config.max_wait(), Duration::ZERO);

        let outcome = poll_until(&config, "once", || async { Ok(Some("gone")) }).await;
        assert_eq!(outcome, PollOutcome::Ready("gone"));
    }
}
