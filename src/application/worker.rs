//! The orchestration workflow driven by creation events.
//!
//! Each event walks one request through
//! `Received -> Processing -> WaitingExternal -> Completed | Failed`, persisting after
//! every step. An event for a request that stopped half way (shutdown, or a failed
//! recovery) picks the workflow up again at the status it was left in, which is what
//! makes dead-letter replay useful. Failures are contained per event: an unexpected
//! error marks the request `Failed` with an `Internal error: ...` detail and the
//! consumer moves on.

use crate::application::retry::deliver_with_policy;
use crate::config::WorkerConfig;
use crate::domain::events::IntegrationRequestCreated;
use crate::domain::ports::{ExternalSystemClientRef, RequestRepositoryFactory};
use crate::domain::request::IntegrationStatus;
use crate::error::{HubError, Result};
use crate::infrastructure::message_bus::InMemoryMessageBus;
use crate::logging::request_span;
use crate::shutdown::{ShutdownSignal, is_cancelled, sleep_or_cancel};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, error, info, warn};
use uuid::Uuid;

/// How the handling of one creation event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// The partner accepted the payload.
    Completed,
    /// The request was persisted as `Failed`, either refused by the partner or
    /// recovered after an internal error.
    Failed,
    /// The request no longer exists.
    Abandoned,
    /// The request had already finished; the event was a duplicate delivery.
    Skipped,
    /// Shutdown interrupted the workflow; the request keeps its last saved status.
    Cancelled,
    /// An internal error occurred and the request could not be marked `Failed`.
    Unrecoverable,
}

impl fmt::Display for WorkflowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowOutcome::Completed => "completed",
            WorkflowOutcome::Failed => "failed",
            WorkflowOutcome::Abandoned => "abandoned",
            WorkflowOutcome::Skipped => "skipped",
            WorkflowOutcome::Cancelled => "cancelled",
            WorkflowOutcome::Unrecoverable => "unrecoverable",
        };
        f.write_str(name)
    }
}

/// Consumes creation events and drives each request to a terminal status.
///
/// Events are handled one at a time, so a request is never written by two workflows
/// of the same worker concurrently.
pub struct OrchestrationWorker {
    bus: Arc<InMemoryMessageBus<IntegrationRequestCreated>>,
    repositories: RequestRepositoryFactory,
    external: ExternalSystemClientRef,
    config: WorkerConfig,
    span: Span,
}

impl OrchestrationWorker {
    /// Creates a worker.
    ///
    /// # Arguments
    ///
    /// * `bus` - Router the creation events are consumed from.
    /// * `repositories` - Factory called once per event (and once more for recovery) to
    ///   obtain a repository handle that lives only as long as that unit of work.
    /// * `external` - Gateway to partner systems.
    /// * `config` - Channel name, preparation delay and delivery policy.
    pub fn new(
        bus: Arc<InMemoryMessageBus<IntegrationRequestCreated>>,
        repositories: RequestRepositoryFactory,
        external: ExternalSystemClientRef,
        config: WorkerConfig,
    ) -> Self {
        Self {
            bus,
            repositories,
            external,
            config,
            span: tracing::info_span!("orchestration_worker"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Consumes the configured channel until `shutdown` fires.
    ///
    /// `Unrecoverable` and `Cancelled` outcomes leave the request short of a terminal
    /// status. They are reported back to the router as handler errors so they are logged
    /// there and, when enabled, dead-lettered for replay.
    pub async fn run(&self, shutdown: ShutdownSignal) -> Result<()> {
        info!(parent: &self.span, channel = %self.config.channel, "Orchestration worker starting");
        let worker = self;
        let handler_shutdown = shutdown.clone();
        let result = self
            .bus
            .consume(
                &self.config.channel,
                move |event: IntegrationRequestCreated, correlation_id: String| {
                    let shutdown = handler_shutdown.clone();
                    async move {
                        let request_id = event.request_id;
                        match worker.process_event(event, correlation_id, shutdown).await {
                            WorkflowOutcome::Unrecoverable => Err(HubError::GatewayFailure(
                                format!("Request {} left in an intermediate state", request_id),
                            )),
                            WorkflowOutcome::Cancelled => Err(HubError::Cancelled),
                            _ => Ok(()),
                        }
                    }
                },
                shutdown,
            )
            .await;
        info!(parent: &self.span, "Orchestration worker stopped");
        result
    }

    /// Runs the worker on its own task.
    pub fn spawn(self: Arc<Self>, shutdown: ShutdownSignal) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Handles one creation event. Never fails; the outcome describes what happened.
    pub async fn process_event(
        &self,
        event: IntegrationRequestCreated,
        correlation_id: String,
        mut shutdown: ShutdownSignal,
    ) -> WorkflowOutcome {
        let span = request_span(&self.span, "orchestrate", event.request_id, &correlation_id);
        async move {
            if is_cancelled(&shutdown) {
                warn!("Shutdown requested before processing started");
                return WorkflowOutcome::Cancelled;
            }

            let outcome = match self.execute(&event, &correlation_id, &mut shutdown).await {
                Ok(outcome) => outcome,
                Err(HubError::Cancelled) => {
                    warn!("Workflow cancelled, request keeps its last saved status");
                    WorkflowOutcome::Cancelled
                }
                Err(e) => {
                    error!(error = %e, "Error processing integration request");
                    self.recover(event.request_id, &e).await
                }
            };

            info!(%outcome, "Workflow finished");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        event: &IntegrationRequestCreated,
        correlation_id: &str,
        shutdown: &mut ShutdownSignal,
    ) -> Result<WorkflowOutcome> {
        let repository = (self.repositories)();

        let Some(mut request) = repository.load(event.request_id).await? else {
            warn!("Integration request not found");
            return Ok(WorkflowOutcome::Abandoned);
        };

        if request.is_terminal() {
            info!(status = %request.status(), "Integration request already finished, skipping");
            return Ok(WorkflowOutcome::Skipped);
        }
        if request.status() != IntegrationStatus::Received {
            info!(status = %request.status(), "Resuming integration request");
        }

        if request.status() == IntegrationStatus::Received {
            request.mark_processing()?;
            repository.save(&request).await?;
            info!(status = %request.status(), "Integration request status updated");
        }

        if request.status() == IntegrationStatus::Processing {
            if !sleep_or_cancel(self.preparation_delay(), shutdown).await {
                return Err(HubError::Cancelled);
            }
            request.mark_waiting_external()?;
            repository.save(&request).await?;
            info!(status = %request.status(), "Integration request status updated");
        }

        let accepted = deliver_with_policy(
            self.external.as_ref(),
            request.target_system(),
            request.payload(),
            correlation_id,
            &self.config.retry,
            self.config.delivery_timeout(),
            shutdown,
        )
        .await?;

        let outcome = if accepted {
            request.mark_completed()?;
            WorkflowOutcome::Completed
        } else {
            let rejection = HubError::DeliveryRejected {
                target_system: request.target_system().to_string(),
            };
            request.mark_failed(rejection.to_string())?;
            WorkflowOutcome::Failed
        };
        repository.save(&request).await?;

        info!(
            status = %request.status(),
            error_detail = request.error_detail().unwrap_or_default(),
            "Integration request processed"
        );
        Ok(outcome)
    }

    async fn recover(&self, request_id: Uuid, cause: &HubError) -> WorkflowOutcome {
        match self.mark_internal_failure(request_id, cause).await {
            Ok(()) => {
                warn!("Integration request marked as failed after internal error");
                WorkflowOutcome::Failed
            }
            Err(e) => {
                error!(error = %e, "Failed to mark integration request as failed");
                WorkflowOutcome::Unrecoverable
            }
        }
    }

    async fn mark_internal_failure(&self, request_id: Uuid, cause: &HubError) -> Result<()> {
        let repository = (self.repositories)();
        let mut request = repository
            .load(request_id)
            .await?
            .ok_or(HubError::NotFound(request_id))?;
        request.mark_failed(format!("Internal error: {}", cause))?;
        repository.save(&request).await
    }

    fn preparation_delay(&self) -> Duration {
        let min = self.config.preparation_delay_min_ms;
        let max = self.config.preparation_delay_max_ms.max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
