use crate::domain::request::{IntegrationRequest, IntegrationStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

#[derive(Serialize)]
struct StatusRow<'a> {
    id: Uuid,
    external_id: &'a str,
    source_system: &'a str,
    target_system: &'a str,
    status: IntegrationStatus,
    error_detail: &'a str,
    correlation_id: &'a str,
}

impl<'a> From<&'a IntegrationRequest> for StatusRow<'a> {
    fn from(request: &'a IntegrationRequest) -> Self {
        Self {
            id: request.id(),
            external_id: request.external_id(),
            source_system: request.source_system(),
            target_system: request.target_system(),
            status: request.status(),
            error_detail: request.error_detail().unwrap_or_default(),
            correlation_id: request.correlation_id(),
        }
    }
}

/// Writes a status report, one row per request, in the order given.
pub struct StatusWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> StatusWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_requests<'a, I>(&mut self, requests: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a IntegrationRequest>,
    {
        for request in requests {
            self.writer.serialize(StatusRow::from(request))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
