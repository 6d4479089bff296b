use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::routing::RoutingDescriptor;

/// Install the JSON structured-logging subscriber.
///
/// `RUST_LOG` overrides the default `info` level. Calling this twice is an
/// error from `tracing-subscriber`, so only the binary calls it.
pub fn init_telemetry() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()?;

    tracing::debug!("telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the log lines of one submission
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one submission attempt.
pub fn submission_span(variant: &'static str, routing: &RoutingDescriptor) -> tracing::Span {
    tracing::info_span!(
        "submission",
        correlation.id = %generate_correlation_id(),
        variant = variant,
        target = %routing.target.slug(),
        source = %routing.source.slug(),
        local_path = %routing.local_path.display(),
    )
}
