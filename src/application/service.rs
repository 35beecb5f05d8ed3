use crate::domain::events::{IntegrationRequestCreated, REQUEST_CREATED_CHANNEL};
use crate::domain::ports::{MessagePublisher, RequestRepositoryBox};
use crate::domain::request::{IntegrationRequest, IntegrationStatus};
use crate::error::Result;
use crate::logging::request_span;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{Instrument, Span, debug, error, info};
use uuid::Uuid;

/// A partner's request to move `payload` from `source_system` to `target_system`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct SubmitRequest {
    pub external_id: String,
    pub source_system: String,
    pub target_system: String,
    pub payload: String,
}

pub type CreatedEventPublisher = Arc<dyn MessagePublisher<IntegrationRequestCreated>>;

/// Entry point used by intake surfaces: records new requests, announces them to the
/// workflow, and answers status queries.
pub struct IntegrationRequestService {
    repository: RequestRepositoryBox,
    publisher: CreatedEventPublisher,
    channel: String,
    span: Span,
}

impl IntegrationRequestService {
    /// Creates a service publishing creation events on the default channel.
    ///
    /// # Arguments
    ///
    /// * `repository` - Where new requests are persisted and queries are answered from.
    /// * `publisher` - Router the creation events are published to.
    pub fn new(repository: RequestRepositoryBox, publisher: CreatedEventPublisher) -> Self {
        Self {
            repository,
            publisher,
            channel: REQUEST_CREATED_CHANNEL.to_string(),
            span: tracing::info_span!("intake"),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Records a new request and publishes its creation event.
    ///
    /// A missing `correlation_id` is replaced by a fresh UUID. Invalid input is rejected
    /// before anything is stored. If publishing fails the request stays persisted in
    /// `Received` and the error is returned.
    pub async fn submit(
        &self,
        command: SubmitRequest,
        correlation_id: Option<String>,
    ) -> Result<IntegrationRequest> {
        let correlation_id = correlation_id
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let request = IntegrationRequest::new(
            command.external_id,
            command.source_system,
            command.target_system,
            command.payload,
            correlation_id,
        )?;

        let span = request_span(&self.span, "submit", request.id(), request.correlation_id());
        async {
            info!(
                external_id = request.external_id(),
                source_system = request.source_system(),
                target_system = request.target_system(),
                "Creating integration request"
            );

            self.repository.save(&request).await?;

            let event = IntegrationRequestCreated::from(&request);
            if let Err(e) = self
                .publisher
                .publish(event, &self.channel, request.correlation_id())
                .await
            {
                error!(error = %e, channel = %self.channel, "Failed to publish creation event");
                return Err(e);
            }

            info!("Integration request created");
            Ok(request)
        }
        .instrument(span)
        .await
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<IntegrationRequest>> {
        debug!(parent: &self.span, request_id = %id, "Fetching integration request by id");
        self.repository.load(id).await
    }

    pub async fn get_by_external_id(&self, external_id: &str) -> Result<Option<IntegrationRequest>> {
        debug!(parent: &self.span, external_id, "Fetching integration request by external id");
        self.repository.load_by_external_id(external_id).await
    }

    /// All requests, newest first.
    pub async fn list_all(&self) -> Result<Vec<IntegrationRequest>> {
        debug!(parent: &self.span, "Fetching all integration requests");
        self.repository.list_all().await
    }

    pub async fn list_by_status(&self, status: IntegrationStatus) -> Result<Vec<IntegrationRequest>> {
        debug!(parent: &self.span, %status, "Fetching integration requests by status");
        self.repository.list_by_status(status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::domain::ports::RequestRepository;
    use crate::error::HubError;
    use crate::infrastructure::in_memory::InMemoryRequestRepository;
    use crate::infrastructure::message_bus::InMemoryMessageBus;

    fn command(external_id: &str) -> SubmitRequest {
        SubmitRequest {
            external_id: external_id.to_string(),
            source_system: "PartnerA".to_string(),
            target_system: "Totvs".to_string(),
            payload: r#"{"test":"data"}"#.to_string(),
        }
    }

    fn service() -> (
        IntegrationRequestService,
        InMemoryRequestRepository,
        Arc<InMemoryMessageBus<IntegrationRequestCreated>>,
    ) {
        let repo = InMemoryRequestRepository::new();
        let bus = Arc::new(InMemoryMessageBus::new(BusConfig::default()));
        let service = IntegrationRequestService::new(Box::new(repo.clone()), bus.clone());
        (service, repo, bus)
    }

    #[tokio::test]
    async fn test_submit_persists_and_publishes() {
        let (service, repo, bus) = service();

        let created = service
            .submit(command("EXT-12345"), Some("corr-1".to_string()))
            .await
            .unwrap();

        assert_eq!(created.status(), IntegrationStatus::Received);
        assert_eq!(created.correlation_id(), "corr-1");

        let stored = repo.load(created.id()).await.unwrap().unwrap();
        assert_eq!(stored, created);

        let envelope = bus
            .try_dequeue(REQUEST_CREATED_CHANNEL)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.correlation_id, "corr-1");
        assert_eq!(envelope.message.request_id, created.id());
        assert_eq!(envelope.message.external_id, "EXT-12345");
        assert_eq!(bus.pending(REQUEST_CREATED_CHANNEL).await, 0);
    }

    #[tokio::test]
    async fn test_submit_generates_correlation_id() {
        let (service, _repo, _bus) = service();
        let created = service.submit(command("EXT-1"), None).await.unwrap();
        assert!(Uuid::parse_str(created.correlation_id()).is_ok());

        let blank = service
            .submit(command("EXT-2"), Some("  ".to_string()))
            .await
            .unwrap();
        assert!(Uuid::parse_str(blank.correlation_id()).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_submit_stores_nothing() {
        let (service, repo, bus) = service();
        let mut invalid = command("EXT-1");
        invalid.target_system = String::new();

        let result = service.submit(invalid, None).await;

        assert!(matches!(result, Err(HubError::InvalidArgument(_))));
        assert!(repo.list_all().await.unwrap().is_empty());
        assert_eq!(bus.pending(REQUEST_CREATED_CHANNEL).await, 0);
    }

    #[tokio::test]
    async fn test_custom_channel_is_used() {
        let (service, _repo, bus) = service();
        let service = service.with_channel("partner-intake");
        service.submit(command("EXT-1"), None).await.unwrap();

        assert_eq!(bus.pending("partner-intake").await, 1);
        assert_eq!(bus.pending(REQUEST_CREATED_CHANNEL).await, 0);
    }

    #[tokio::test]
    async fn test_queries() {
        let (service, _repo, _bus) = service();
        let first = service.submit(command("EXT-001"), None).await.unwrap();
        service.submit(command("EXT-002"), None).await.unwrap();

        assert_eq!(
            service.get_by_id(first.id()).await.unwrap().map(|r| r.id()),
            Some(first.id())
        );
        assert!(service.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(
            service
                .get_by_external_id("EXT-002")
                .await
                .unwrap()
                .map(|r| r.external_id().to_string()),
            Some("EXT-002".to_string())
        );
        assert_eq!(service.list_all().await.unwrap().len(), 2);
        assert_eq!(
            service
                .list_by_status(IntegrationStatus::Received)
                .await
                .unwrap()
                .len(),
            2
        );
        assert!(
            service
                .list_by_status(IntegrationStatus::Failed)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
