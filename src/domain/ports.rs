use super::request::{IntegrationRequest, IntegrationStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Persistence gateway for integration requests.
///
/// Implementations must return the latest `save` for an id on the next `load` made by
/// the same process.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<IntegrationRequest>>;
    /// The request most recently saved under `external_id`.
    async fn load_by_external_id(&self, external_id: &str) -> Result<Option<IntegrationRequest>>;
    async fn save(&self, request: &IntegrationRequest) -> Result<()>;
    /// All requests, newest first.
    async fn list_all(&self) -> Result<Vec<IntegrationRequest>>;
    /// Requests currently in `status`, newest first.
    async fn list_by_status(&self, status: IntegrationStatus) -> Result<Vec<IntegrationRequest>>;
}

/// Delivers a payload to a partner system.
///
/// `Ok(false)` means the partner answered and refused; `Err` means the call itself failed.
#[async_trait]
pub trait ExternalSystemClient: Send + Sync {
    async fn deliver(&self, target_system: &str, payload: &str, correlation_id: &str)
    -> Result<bool>;
}

/// Producer side of the message router.
#[async_trait]
pub trait MessagePublisher<M>: Send + Sync
where
    M: Send + 'static,
{
    async fn publish(&self, message: M, channel: &str, correlation_id: &str) -> Result<()>;
}

pub type RequestRepositoryBox = Box<dyn RequestRepository>;
pub type ExternalSystemClientRef = Arc<dyn ExternalSystemClient>;

/// Hands out a short-lived repository handle for one unit of work.
pub type RequestRepositoryFactory = Arc<dyn Fn() -> RequestRepositoryBox + Send + Sync>;
