//! Runtime configuration.
//!
//! Every section has defaults reproducing the minimal workflow contract: unbounded
//! channels with log-and-drop on handler failure, a single delivery attempt without a
//! deadline, and a one second polling interval. A JSON file can override any subset of
//! fields; the binary then applies command-line overrides on top.

use crate::application::retry::RetryPolicy;
use crate::domain::events::REQUEST_CREATED_CHANNEL;
use crate::error::{HubError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What `publish` does when a bounded channel is already full.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Refuse the new message with `HubError::ChannelFull`.
    #[default]
    Reject,
    /// Evict the oldest pending message to make room.
    DropOldest,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct BusConfig {
    /// Maximum pending messages per channel; `None` means unbounded.
    pub capacity: Option<usize>,
    pub overflow: OverflowPolicy,
    /// Route evicted and failed messages to `<channel>.dead-letter`.
    pub dead_letter: bool,
    pub poll_interval_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            overflow: OverflowPolicy::Reject,
            dead_letter: false,
            poll_interval_ms: 1000,
        }
    }
}

impl BusConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub channel: String,
    pub preparation_delay_min_ms: u64,
    pub preparation_delay_max_ms: u64,
    /// Deadline for a single delivery attempt; `None` waits indefinitely.
    pub delivery_timeout_ms: Option<u64>,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            channel: REQUEST_CREATED_CHANNEL.to_string(),
            preparation_delay_min_ms: 500,
            preparation_delay_max_ms: 1500,
            delivery_timeout_ms: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl WorkerConfig {
    pub fn delivery_timeout(&self) -> Option<Duration> {
        self.delivery_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct ExternalClientConfig {
    /// Probability in `[0, 1]` that a simulated delivery is accepted.
    pub success_rate: f64,
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
}

impl Default for ExternalClientConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.9,
            latency_min_ms: 100,
            latency_max_ms: 500,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct HubConfig {
    pub log_level: String,
    pub bus: BusConfig,
    pub worker: WorkerConfig,
    pub external: ExternalClientConfig,
    /// How long the batch runner waits for submitted requests to reach a terminal state.
    pub drain_timeout_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            bus: BusConfig::default(),
            worker: WorkerConfig::default(),
            external: ExternalClientConfig::default(),
            drain_timeout_ms: 30_000,
        }
    }
}

impl HubConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: HubConfig = serde_json::from_str(&contents).map_err(|e| {
            HubError::Config(format!(
                "Failed to parse {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bus.capacity == Some(0) {
            return Err(HubError::Config("bus.capacity must be at least 1".into()));
        }
        if self.bus.poll_interval_ms == 0 {
            return Err(HubError::Config(
                "bus.poll_interval_ms must be positive".into(),
            ));
        }
        if self.worker.channel.trim().is_empty() {
            return Err(HubError::Config("worker.channel must not be empty".into()));
        }
        if self.worker.preparation_delay_min_ms > self.worker.preparation_delay_max_ms {
            return Err(HubError::Config(
                "worker.preparation_delay_min_ms exceeds preparation_delay_max_ms".into(),
            ));
        }
        if self.worker.delivery_timeout_ms == Some(0) {
            return Err(HubError::Config(
                "worker.delivery_timeout_ms must be positive".into(),
            ));
        }
        self.worker.retry.validate()?;
        if !(0.0..=1.0).contains(&self.external.success_rate) {
            return Err(HubError::Config(
                "external.success_rate must be between 0 and 1".into(),
            ));
        }
        if self.external.latency_min_ms > self.external.latency_max_ms {
            return Err(HubError::Config(
                "external.latency_min_ms exceeds latency_max_ms".into(),
            ));
        }
        Ok(())
    }
}
