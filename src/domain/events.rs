use super::request::IntegrationRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Channel on which creation events are published and consumed.
pub const REQUEST_CREATED_CHANNEL: &str = "integration-request-created";

/// Domain event emitted once, when a new integration request has been persisted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct IntegrationRequestCreated {
    pub request_id: Uuid,
    pub external_id: String,
    pub source_system: String,
    pub target_system: String,
    pub correlation_id: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<&IntegrationRequest> for IntegrationRequestCreated {
    fn from(request: &IntegrationRequest) -> Self {
        Self {
            request_id: request.id(),
            external_id: request.external_id().to_string(),
            source_system: request.source_system().to_string(),
            target_system: request.target_system().to_string(),
            correlation_id: request.correlation_id().to_string(),
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_mirrors_request() {
        let request = IntegrationRequest::new("EXT-1", "A", "B", "{}", "corr-9").unwrap();
        let event = IntegrationRequestCreated::from(&request);

        assert_eq!(event.request_id, request.id());
        assert_eq!(event.external_id, "EXT-1");
        assert_eq!(event.source_system, "A");
        assert_eq!(event.target_system, "B");
        assert_eq!(event.correlation_id, "corr-9");
        assert!(event.occurred_at >= request.created_at());
    }
}
