use crate::config::ExternalClientConfig;
use crate::domain::ports::ExternalSystemClient;
use crate::error::Result;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::{Span, info, warn};

/// Stand-in for partner connectors: waits a random latency, then accepts or refuses
/// the delivery with the configured success rate.
pub struct SimulatedExternalClient {
    config: ExternalClientConfig,
    span: Span,
}

impl SimulatedExternalClient {
    pub fn new(config: ExternalClientConfig) -> Self {
        Self {
            config,
            span: tracing::info_span!("external_client"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Draws latency and outcome up front; the RNG is not held across the await.
    fn roll(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let max = self.config.latency_max_ms.max(self.config.latency_min_ms);
        let latency = rng.gen_range(self.config.latency_min_ms..=max);
        let accepted = rng.gen_bool(self.config.success_rate.clamp(0.0, 1.0));
        (Duration::from_millis(latency), accepted)
    }
}

#[async_trait]
impl ExternalSystemClient for SimulatedExternalClient {
    async fn deliver(
        &self,
        target_system: &str,
        payload: &str,
        correlation_id: &str,
    ) -> Result<bool> {
        info!(
            parent: &self.span,
            target_system,
            correlation_id,
            payload_bytes = payload.len(),
            "Sending data to external system"
        );

        let (latency, accepted) = self.roll();
        tokio::time::sleep(latency).await;

        if accepted {
            info!(parent: &self.span, target_system, correlation_id, "Data sent successfully");
        } else {
            warn!(
                parent: &self.span,
                target_system,
                correlation_id,
                "External system refused data"
            );
        }
        Ok(accepted)
    }
}
