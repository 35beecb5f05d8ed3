use clap::Parser;
use integration_hub::application::service::IntegrationRequestService;
use integration_hub::application::worker::OrchestrationWorker;
use integration_hub::config::HubConfig;
use integration_hub::domain::events::IntegrationRequestCreated;
use integration_hub::domain::ports::{RequestRepositoryBox, RequestRepositoryFactory};
use integration_hub::domain::request::IntegrationRequest;
use integration_hub::infrastructure::external_client::SimulatedExternalClient;
use integration_hub::infrastructure::in_memory::InMemoryRequestRepository;
use integration_hub::infrastructure::message_bus::InMemoryMessageBus;
use integration_hub::interfaces::csv::request_reader::RequestReader;
use integration_hub::interfaces::csv::status_writer::StatusWriter;
use integration_hub::logging::init_logging;
use integration_hub::shutdown::shutdown_channel;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn};
use uuid::Uuid;

const DRAIN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input submissions CSV file (external_id,source_system,target_system,payload)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "INTEGRATION_HUB_DB_PATH")]
    db_path: Option<PathBuf>,

    /// JSON configuration file; command-line flags override its values.
    #[arg(long, env = "INTEGRATION_HUB_CONFIG")]
    config: Option<PathBuf>,

    /// Probability in [0, 1] that the simulated partner accepts a delivery.
    #[arg(long)]
    success_rate: Option<f64>,

    /// Fixed preparation delay, replacing the configured random range.
    #[arg(long)]
    preparation_delay_ms: Option<u64>,

    /// How long the consumer waits before polling an empty channel again.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Upper bound on waiting for submitted requests to finish.
    #[arg(long)]
    drain_timeout_ms: Option<u64>,
}

impl Cli {
    fn load_config(&self) -> Result<HubConfig> {
        let mut config = match &self.config {
            Some(path) => HubConfig::from_file(path).into_diagnostic()?,
            None => HubConfig::default(),
        };

        if let Some(rate) = self.success_rate {
            config.external.success_rate = rate;
        }
        if let Some(delay) = self.preparation_delay_ms {
            config.worker.preparation_delay_min_ms = delay;
            config.worker.preparation_delay_max_ms = delay;
        }
        if let Some(interval) = self.poll_interval_ms {
            config.bus.poll_interval_ms = interval;
        }
        if let Some(timeout) = self.drain_timeout_ms {
            config.drain_timeout_ms = timeout;
        }

        config.validate().into_diagnostic()?;
        Ok(config)
    }
}

#[cfg(feature = "storage-rocksdb")]
fn repository_factory(db_path: Option<PathBuf>) -> Result<RequestRepositoryFactory> {
    use integration_hub::infrastructure::rocksdb::RocksDBRequestRepository;

    if let Some(db_path) = db_path {
        let store = RocksDBRequestRepository::open(db_path).into_diagnostic()?;
        return Ok(Arc::new(move || {
            Box::new(store.clone()) as RequestRepositoryBox
        }));
    }
    Ok(in_memory_factory())
}

#[cfg(not(feature = "storage-rocksdb"))]
fn repository_factory(db_path: Option<PathBuf>) -> Result<RequestRepositoryFactory> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_factory())
}

fn in_memory_factory() -> RequestRepositoryFactory {
    let store = InMemoryRequestRepository::new();
    Arc::new(move || Box::new(store.clone()) as RequestRepositoryBox)
}

/// Submitted requests that have not reached a terminal status yet.
async fn pending_requests(
    service: &IntegrationRequestService,
    submitted: &[Uuid],
) -> Result<Vec<Uuid>> {
    let mut pending = Vec::new();
    for id in submitted {
        match service.get_by_id(*id).await.into_diagnostic()? {
            Some(request) if !request.is_terminal() => pending.push(*id),
            _ => {}
        }
    }
    Ok(pending)
}

async fn drain(
    service: &IntegrationRequestService,
    submitted: &[Uuid],
    timeout: Duration,
) -> Result<()> {
    let wait = async {
        while !pending_requests(service, submitted).await?.is_empty() {
            tokio::time::sleep(DRAIN_CHECK_INTERVAL).await;
        }
        Ok::<(), miette::Report>(())
    };

    tokio::select! {
        drained = tokio::time::timeout(timeout, wait) => match drained {
            Ok(result) => {
                result?;
            }
            Err(_) => {
                let pending = pending_requests(service, submitted).await?;
                eprintln!(
                    "WARNING: Drain timeout expired with {} request(s) still in progress.",
                    pending.len()
                );
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping before all requests finished");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_logging(&config.log_level);

    let root = info_span!("integration_hub", run_id = %Uuid::new_v4());

    let repositories = repository_factory(cli.db_path.clone())?;
    let bus = Arc::new(
        InMemoryMessageBus::<IntegrationRequestCreated>::new(config.bus.clone())
            .with_span(info_span!(parent: &root, "message_bus")),
    );
    let service = IntegrationRequestService::new(repositories(), bus.clone())
        .with_channel(config.worker.channel.clone())
        .with_span(info_span!(parent: &root, "intake"));
    let external = Arc::new(
        SimulatedExternalClient::new(config.external.clone())
            .with_span(info_span!(parent: &root, "external_client")),
    );
    let worker = Arc::new(
        OrchestrationWorker::new(bus, repositories, external, config.worker.clone())
            .with_span(info_span!(parent: &root, "orchestration_worker")),
    );

    let (trigger, signal) = shutdown_channel();
    let consumer = worker.spawn(signal);

    // Submit requests
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = RequestReader::new(file);
    let mut submitted = Vec::new();
    for row in reader.requests() {
        match row {
            Ok(command) => match service.submit(command, None).await {
                Ok(request) => submitted.push(request.id()),
                Err(e) => eprintln!("Error submitting request: {}", e),
            },
            Err(e) => eprintln!("Error reading request: {}", e),
        }
    }
    info!(count = submitted.len(), "Submitted integration requests");

    drain(&service, &submitted, config.drain_timeout()).await?;

    // Stop consuming
    let _ = trigger.send(true);
    consumer.await.into_diagnostic()?.into_diagnostic()?;

    // Collect final state in submission order
    let mut report: Vec<IntegrationRequest> = Vec::with_capacity(submitted.len());
    for id in &submitted {
        if let Some(request) = service.get_by_id(*id).await.into_diagnostic()? {
            report.push(request);
        }
    }

    let stdout = io::stdout();
    let mut writer = StatusWriter::new(stdout.lock());
    writer.write_requests(&report).into_diagnostic()?;

    Ok(())
}
