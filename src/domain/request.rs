use crate::error::{HubError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of an integration request.
///
/// The allowed edges are:
///
/// ```text
/// Received -> Processing -> WaitingExternal -> Completed
///     \            \              \
///      +------------+--------------+-> Failed
/// ```
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
pub enum IntegrationStatus {
    Received,
    Processing,
    WaitingExternal,
    Completed,
    Failed,
}

impl IntegrationStatus {
    pub const ALL: [IntegrationStatus; 5] = [
        IntegrationStatus::Received,
        IntegrationStatus::Processing,
        IntegrationStatus::WaitingExternal,
        IntegrationStatus::Completed,
        IntegrationStatus::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, IntegrationStatus::Completed | IntegrationStatus::Failed)
    }

    pub fn can_transition_to(self, next: IntegrationStatus) -> bool {
        use IntegrationStatus::*;
        matches!(
            (self, next),
            (Received, Processing)
                | (Processing, WaitingExternal)
                | (WaitingExternal, Completed)
                | (Received | Processing | WaitingExternal, Failed)
        )
    }

    /// Validates the edge `self -> next` against the lifecycle graph.
    pub fn transition_to(self, next: IntegrationStatus) -> Result<IntegrationStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(HubError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntegrationStatus::Received => "Received",
            IntegrationStatus::Processing => "Processing",
            IntegrationStatus::WaitingExternal => "WaitingExternal",
            IntegrationStatus::Completed => "Completed",
            IntegrationStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationStatus {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        IntegrationStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HubError::InvalidArgument(format!("Unknown status '{}'", s)))
    }
}

/// One integration request and its position in the workflow.
///
/// Identity, partner reference, routing, payload and correlation id are fixed at
/// construction and only readable afterwards. The status moves exclusively through the
/// `mark_*` methods, which reject edges outside the lifecycle graph.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct IntegrationRequest {
    id: Uuid,
    external_id: String,
    source_system: String,
    target_system: String,
    payload: String,
    status: IntegrationStatus,
    correlation_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    error_detail: Option<String>,
}

impl IntegrationRequest {
    pub fn new(
        external_id: impl Into<String>,
        source_system: impl Into<String>,
        target_system: impl Into<String>,
        payload: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            external_id: required("external_id", external_id.into())?,
            source_system: required("source_system", source_system.into())?,
            target_system: required("target_system", target_system.into())?,
            payload: required("payload", payload.into())?,
            status: IntegrationStatus::Received,
            correlation_id: required("correlation_id", correlation_id.into())?,
            created_at: now,
            updated_at: now,
            error_detail: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn source_system(&self) -> &str {
        &self.source_system
    }

    pub fn target_system(&self) -> &str {
        &self.target_system
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn status(&self) -> IntegrationStatus {
        self.status
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn mark_processing(&mut self) -> Result<()> {
        self.apply(IntegrationStatus::Processing, None)
    }

    pub fn mark_waiting_external(&mut self) -> Result<()> {
        self.apply(IntegrationStatus::WaitingExternal, None)
    }

    pub fn mark_completed(&mut self) -> Result<()> {
        self.apply(IntegrationStatus::Completed, None)
    }

    /// Moves the request to `Failed`, recording `reason` as the error detail.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        let reason = required("reason", reason.into())?;
        self.apply(IntegrationStatus::Failed, Some(reason))
    }

    fn apply(&mut self, next: IntegrationStatus, error_detail: Option<String>) -> Result<()> {
        self.status = self.status.transition_to(next)?;
        self.error_detail = error_detail;
        // Wall clocks can step backwards; updated_at must not.
        self.updated_at = Utc::now().max(self.updated_at);
        Ok(())
    }
}

fn required(field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        Err(HubError::InvalidArgument(format!(
            "{} must not be empty",
            field
        )))
    } else {
        Ok(value)
    }
}
