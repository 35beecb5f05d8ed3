use crate::domain::ports::RequestRepository;
use crate::domain::request::{IntegrationRequest, IntegrationStatus};
use crate::error::{HubError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Column Family holding serialized requests, keyed by request id.
pub const CF_REQUESTS: &str = "requests";
/// Column Family mapping partner external ids to request ids.
pub const CF_EXTERNAL_IDS: &str = "external_ids";

/// A persistent repository implementation using RocksDB.
///
/// Requests are stored as JSON under their 16-byte UUID. A second column family indexes
/// them by external id; both are written in one batch so the index never points at a
/// request that was not stored.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBRequestRepository {
    db: Arc<DB>,
}

impl RocksDBRequestRepository {
    /// Opens or creates a RocksDB instance at the specified path, creating the column
    /// families if they are missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_requests = ColumnFamilyDescriptor::new(CF_REQUESTS, Options::default());
        let cf_external = ColumnFamilyDescriptor::new(CF_EXTERNAL_IDS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_requests, cf_external])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| HubError::GatewayFailure(format!("Column family '{}' not found", name)))
    }

    fn decode(bytes: &[u8]) -> Result<IntegrationRequest> {
        serde_json::from_slice(bytes).map_err(|e| {
            HubError::GatewayFailure(format!("Failed to deserialize request: {}", e))
        })
    }

    fn scan<F>(&self, keep: F) -> Result<Vec<IntegrationRequest>>
    where
        F: Fn(&IntegrationRequest) -> bool,
    {
        let cf = self.cf(CF_REQUESTS)?;
        let mut requests = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let request = Self::decode(&value)?;
            if keep(&request) {
                requests.push(request);
            }
        }
        requests.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(requests)
    }
}

#[async_trait]
impl RequestRepository for RocksDBRequestRepository {
    async fn load(&self, id: Uuid) -> Result<Option<IntegrationRequest>> {
        let cf = self.cf(CF_REQUESTS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_by_external_id(&self, external_id: &str) -> Result<Option<IntegrationRequest>> {
        let indexed = {
            let cf = self.cf(CF_EXTERNAL_IDS)?;
            self.db.get_cf(cf, external_id.as_bytes())?
        };
        let Some(id_bytes) = indexed else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&id_bytes)
            .map_err(|e| HubError::GatewayFailure(format!("Corrupt external id index: {}", e)))?;
        self.load(id).await
    }

    async fn save(&self, request: &IntegrationRequest) -> Result<()> {
        let requests = self.cf(CF_REQUESTS)?;
        let external_ids = self.cf(CF_EXTERNAL_IDS)?;

        let value = serde_json::to_vec(request).map_err(|e| {
            HubError::GatewayFailure(format!("Failed to serialize request: {}", e))
        })?;

        let mut batch = WriteBatch::default();
        batch.put_cf(requests, request.id().as_bytes(), value);
        batch.put_cf(
            external_ids,
            request.external_id().as_bytes(),
            request.id().as_bytes(),
        );
        self.db.write(batch)?;

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<IntegrationRequest>> {
        self.scan(|_| true)
    }

    async fn list_by_status(&self, status: IntegrationStatus) -> Result<Vec<IntegrationRequest>> {
        self.scan(|r| r.status() == status)
    }
}
