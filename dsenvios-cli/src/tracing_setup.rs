//! Tracing setup for the dsenvios binary, with optional OTLP export.
//!
//! Usage:
//!   dsenvios --debug ...               # Debug logging to stderr
//!   dsenvios --otel ...                # Also export spans (telemetry feature)
//!   RUST_LOG=dsenvios_server=debug ... # Fine-grained log control
//!
//! Environment variables:
//!   RUST_LOG                      # Log filter (default: info)
//!   OTEL_EXPORTER_OTLP_ENDPOINT   # OTLP endpoint (default: http://localhost:4317)
//!   OTEL_SERVICE_NAME             # Service name (default: dsenvios)

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Default to the debug level when RUST_LOG is unset
    pub debug: bool,
    pub otel: bool,
}

fn env_filter(debug: bool) -> EnvFilter {
    let fallback = if debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Console output only. Logs go to stderr so command output stays pipeable.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config.debug))
        .with_target(config.debug)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

#[cfg(feature = "telemetry")]
pub fn init_tracing_with_otel(config: &TracingConfig) -> Result<()> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::TracerProvider;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());
    let service_name = std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "dsenvios".to_string());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .build()
        .map_err(|e| anyhow!("Failed to create OTLP exporter: {}", e))?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(opentelemetry_sdk::Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.clone(),
        )]))
        .build();

    let tracer = provider.tracer("dsenvios");
    // Dropping the provider stops export.
    let _ = opentelemetry::global::set_tracer_provider(provider);

    tracing_subscriber::registry()
        .with(env_filter(config.debug))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(config.debug)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()
        .map_err(|err| anyhow!(err))?;

    tracing::info!(endpoint = %endpoint, service = %service_name, "OpenTelemetry tracing initialized");
    Ok(())
}

/// Flush pending spans
#[cfg(feature = "telemetry")]
pub fn shutdown_otel() {
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(not(feature = "telemetry"))]
pub fn shutdown_otel() {}

pub fn init(config: &TracingConfig) -> Result<()> {
    #[cfg(feature = "telemetry")]
    if config.otel {
        return init_tracing_with_otel(config);
    }

    #[cfg(not(feature = "telemetry"))]
    if config.otel {
        eprintln!("warning: --otel ignored, dsenvios was built without the telemetry feature");
    }

    init_tracing(config)
}
