//! Delivery policy around the external-system call: optional bounded retry with
//! exponential backoff and jitter, and an optional per-attempt deadline.
//!
//! The default policy makes exactly one attempt with no deadline.

use crate::domain::ports::ExternalSystemClient;
use crate::error::{HubError, Result};
use crate::shutdown::{ShutdownSignal, is_cancelled, sleep_or_cancel};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Randomize each delay within `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn single_attempt() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(HubError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.multiplier < 1.0 {
            return Err(HubError::Config(
                "retry.multiplier must be at least 1.0".into(),
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(HubError::Config(
                "retry.initial_delay_ms exceeds max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    /// Backoff before retry number `retry` (0-based), capped at `max_delay_ms`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64) as u64;
        let millis = if self.jitter && capped > 1 {
            rand::thread_rng().gen_range(capped / 2..=capped)
        } else {
            capped
        };
        Duration::from_millis(millis)
    }
}

/// Calls `client.deliver` under `policy`.
///
/// Only gateway failures are retried. An explicit `Ok(false)` from the partner is a final
/// answer. A timed-out attempt counts as a gateway failure; the abandoned call is dropped.
pub async fn deliver_with_policy(
    client: &dyn ExternalSystemClient,
    target_system: &str,
    payload: &str,
    correlation_id: &str,
    policy: &RetryPolicy,
    deadline: Option<Duration>,
    shutdown: &mut ShutdownSignal,
) -> Result<bool> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if is_cancelled(shutdown) {
            return Err(HubError::Cancelled);
        }
        attempt += 1;

        let call = client.deliver(target_system, payload, correlation_id);
        let outcome = match deadline {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(HubError::GatewayFailure(format!(
                    "Delivery to '{}' timed out after {} ms",
                    target_system,
                    limit.as_millis()
                ))),
            },
            None => call.await,
        };

        match outcome {
            Err(e) if e.is_gateway_failure() && attempt < attempts => {
                let delay = policy.delay_for_retry(attempt - 1);
                warn!(
                    target_system,
                    correlation_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Delivery attempt failed, retrying"
                );
                if !sleep_or_cancel(delay, shutdown).await {
                    return Err(HubError::Cancelled);
                }
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::shutdown_channel;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays scripted outcomes, one per call.
    struct Scripted {
        outcomes: Mutex<Vec<Result<bool>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<bool>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ExternalSystemClient for Scripted {
        async fn deliver(&self, _: &str, _: &str, _: &str) -> Result<bool> {
            *self.calls.lock().unwrap() += 1;
            self.outcomes.lock().unwrap().pop().unwrap_or(Ok(true))
        }
    }

    struct Hanging;

    #[async_trait]
    impl ExternalSystemClient for Hanging {
        async fn deliver(&self, _: &str, _: &str, _: &str) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(true)
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 300,
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(policy.delay_for_retry(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(300));
        assert_eq!(policy.delay_for_retry(10), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            initial_delay_ms: 100,
            max_delay_ms: 100,
            jitter: true,
            ..fast_policy(3)
        };
        for _ in 0..50 {
            let delay = policy.delay_for_retry(0);
            assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(100));
        }
    }

    #[tokio::test]
    async fn test_default_policy_makes_single_attempt() {
        let client = Scripted::new(vec![Err(HubError::GatewayFailure("down".into()))]);
        let (_trigger, mut shutdown) = shutdown_channel();

        let result = deliver_with_policy(
            &client,
            "B",
            "{}",
            "c",
            &RetryPolicy::single_attempt(),
            None,
            &mut shutdown,
        )
        .await;

        assert!(matches!(result, Err(HubError::GatewayFailure(_))));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_gateway_failures_are_retried() {
        let client = Scripted::new(vec![
            Err(HubError::GatewayFailure("down".into())),
            Err(HubError::GatewayFailure("still down".into())),
            Ok(true),
        ]);
        let (_trigger, mut shutdown) = shutdown_channel();

        let result =
            deliver_with_policy(&client, "B", "{}", "c", &fast_policy(3), None, &mut shutdown)
                .await;

        assert!(result.unwrap());
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let client = Scripted::new(vec![Ok(false), Ok(true)]);
        let (_trigger, mut shutdown) = shutdown_channel();

        let result =
            deliver_with_policy(&client, "B", "{}", "c", &fast_policy(3), None, &mut shutdown)
                .await;

        assert!(!result.unwrap());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_deadline_turns_into_gateway_failure() {
        let (_trigger, mut shutdown) = shutdown_channel();

        let result = deliver_with_policy(
            &Hanging,
            "B",
            "{}",
            "c",
            &RetryPolicy::single_attempt(),
            Some(Duration::from_millis(10)),
            &mut shutdown,
        )
        .await;

        match result {
            Err(HubError::GatewayFailure(message)) => assert!(message.contains("timed out")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let client = Scripted::new(vec![Ok(true)]);
        let (trigger, mut shutdown) = shutdown_channel();
        trigger.send(true).unwrap();

        let result = deliver_with_policy(
            &client,
            "B",
            "{}",
            "c",
            &RetryPolicy::single_attempt(),
            None,
            &mut shutdown,
        )
        .await;

        assert!(matches!(result, Err(HubError::Cancelled)));
        assert_eq!(client.calls(), 0);
    }
}
