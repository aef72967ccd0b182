use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Initialize structured logging. JSON output carries the correlation IDs
/// and step-level fields operators grep for when reconstructing a migration.
pub fn init_telemetry(log_level: &str, json_logs: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json_logs {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init();
    }

    tracing::info!("Graduator telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the log lines of one workflow
/// invocation across retries and reschedules.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Create a span with the common migration attributes.
pub fn create_migration_span(
    operation: &str,
    mint: &str,
    correlation_id: Option<&str>,
) -> tracing::Span {
    tracing::info_span!(
        "migration",
        operation = operation,
        mint = mint,
        correlation.id = correlation_id,
    )
}
