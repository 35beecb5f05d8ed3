#![allow(dead_code)]

use async_trait::async_trait;
use integration_hub::domain::ports::{ExternalSystemClient, RequestRepository};
use integration_hub::domain::request::{IntegrationRequest, IntegrationStatus};
use integration_hub::error::{HubError, Result};
use integration_hub::infrastructure::in_memory::InMemoryRequestRepository;
use std::io::{self, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Writes a submissions CSV with the standard header.
pub fn requests_csv(rows: &[[&str; 4]]) -> io::Result<NamedTempFile> {
    let file = NamedTempFile::new()?;
    let mut wtr = csv::Writer::from_path(file.path())?;
    wtr.write_record(["external_id", "source_system", "target_system", "payload"])?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(file)
}

/// Configuration without artificial latency so CLI runs finish quickly.
pub fn fast_config() -> io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"{{
            "log_level": "warn",
            "bus": {{ "poll_interval_ms": 10 }},
            "worker": {{ "preparation_delay_min_ms": 0, "preparation_delay_max_ms": 0 }},
            "external": {{ "latency_min_ms": 0, "latency_max_ms": 0 }},
            "drain_timeout_ms": 10000
        }}"#
    )?;
    Ok(file)
}

#[derive(Clone, Copy, Debug)]
pub enum Reply {
    Accept,
    Refuse,
    Fail,
}

/// Partner stand-in replaying a fixed sequence of replies; the last one repeats.
pub struct ScriptedClient {
    replies: Mutex<Vec<Reply>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(reply: Reply) -> Self {
        Self::new(vec![reply])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalSystemClient for ScriptedClient {
    async fn deliver(&self, _target: &str, _payload: &str, _correlation: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0]
            }
        };
        match reply {
            Reply::Accept => Ok(true),
            Reply::Refuse => Ok(false),
            Reply::Fail => Err(HubError::GatewayFailure("connection refused".into())),
        }
    }
}

/// Shares storage with an in-memory repository but refuses to persist one status.
#[derive(Clone)]
pub struct FlakyRepository {
    pub inner: InMemoryRequestRepository,
    pub refused: IntegrationStatus,
}

#[async_trait]
impl RequestRepository for FlakyRepository {
    async fn load(&self, id: Uuid) -> Result<Option<IntegrationRequest>> {
        self.inner.load(id).await
    }

    async fn load_by_external_id(&self, external_id: &str) -> Result<Option<IntegrationRequest>> {
        self.inner.load_by_external_id(external_id).await
    }

    async fn save(&self, request: &IntegrationRequest) -> Result<()> {
        if request.status() == self.refused {
            return Err(HubError::GatewayFailure("storage unavailable".into()));
        }
        self.inner.save(request).await
    }

    async fn list_all(&self) -> Result<Vec<IntegrationRequest>> {
        self.inner.list_all().await
    }

    async fn list_by_status(&self, status: IntegrationStatus) -> Result<Vec<IntegrationRequest>> {
        self.inner.list_by_status(status).await
    }
}
