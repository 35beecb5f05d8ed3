use crate::domain::ports::RequestRepository;
use crate::domain::request::{IntegrationRequest, IntegrationStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Store {
    requests: HashMap<Uuid, IntegrationRequest>,
    /// Most recently saved request for each external id.
    external_ids: HashMap<String, Uuid>,
}

/// A thread-safe in-memory store for integration requests.
///
/// Requests and the external-id index sit behind one `Arc<RwLock<..>>`; clones share the
/// same store, so every handle handed out by a repository factory observes the same data.
#[derive(Default, Clone)]
pub struct InMemoryRequestRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryRequestRepository {
    /// Creates a new, empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a request, as an operator purge would.
    pub async fn remove(&self, id: Uuid) -> Option<IntegrationRequest> {
        let mut store = self.store.write().await;
        let removed = store.requests.remove(&id)?;
        if store.external_ids.get(removed.external_id()) == Some(&id) {
            store.external_ids.remove(removed.external_id());
        }
        Some(removed)
    }
}

fn newest_first(mut requests: Vec<IntegrationRequest>) -> Vec<IntegrationRequest> {
    requests.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    requests
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn load(&self, id: Uuid) -> Result<Option<IntegrationRequest>> {
        let store = self.store.read().await;
        Ok(store.requests.get(&id).cloned())
    }

    async fn load_by_external_id(&self, external_id: &str) -> Result<Option<IntegrationRequest>> {
        let store = self.store.read().await;
        Ok(store
            .external_ids
            .get(external_id)
            .and_then(|id| store.requests.get(id))
            .cloned())
    }

    async fn save(&self, request: &IntegrationRequest) -> Result<()> {
        let mut store = self.store.write().await;
        store
            .external_ids
            .insert(request.external_id().to_string(), request.id());
        store.requests.insert(request.id(), request.clone());
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<IntegrationRequest>> {
        let store = self.store.read().await;
        Ok(newest_first(store.requests.values().cloned().collect()))
    }

    async fn list_by_status(&self, status: IntegrationStatus) -> Result<Vec<IntegrationRequest>> {
        let store = self.store.read().await;
        Ok(newest_first(
            store
                .requests
                .values()
                .filter(|r| r.status() == status)
                .cloned()
                .collect(),
        ))
    }
}
