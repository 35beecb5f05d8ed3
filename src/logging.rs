//! Structured logging setup and the span shape shared by everything that handles a
//! single integration request.

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
///
/// Output goes to stderr so stdout stays free for reports. Calling this twice, or after
/// another subscriber was installed, is harmless.
pub fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_ansi(false),
    );

    if subscriber.try_init().is_err() {
        tracing::debug!("Global tracing subscriber already initialized");
    }
}

/// Span for one unit of work on one request, carrying its correlation id.
pub fn request_span(
    parent: &Span,
    operation: &'static str,
    request_id: Uuid,
    correlation_id: &str,
) -> Span {
    tracing::info_span!(
        parent: parent,
        "request",
        operation,
        request_id = %request_id,
        correlation_id = %correlation_id,
    )
}
