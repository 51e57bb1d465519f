use crate::config::Environment;
use crate::telemetry::TelemetryGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::Layered, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Initialize tracing subscriber with pretty formatting for development
/// and JSON formatting for production.
///
/// Uses RUST_LOG environment variable for filtering (defaults to "info" if not set).
pub fn setup_logging(environment: Environment) {
    install_subscriber(environment, tracing_opentelemetry::layer());
}

/// Sets up logging, plus OTLP export of spans and metrics when an endpoint is
/// configured. Keep the returned guard alive for the lifetime of the process.
pub fn init_observability(
    service_name: &str,
    otel_endpoint: Option<&str>,
    environment: Environment,
) -> anyhow::Result<Option<TelemetryGuard>> {
    match otel_endpoint {
        Some(endpoint) => {
            let guard = TelemetryGuard::init(service_name, endpoint, environment)?;
            tracing::info!(service_name, endpoint, "OpenTelemetry export enabled");
            Ok(Some(guard))
        }
        None => {
            setup_logging(environment);
            Ok(None)
        }
    }
}

pub(crate) fn install_subscriber<L>(environment: Environment, otel_layer: L)
where
    L: Layer<Layered<EnvFilter, Registry>> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer);

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .init();
        }
        Environment::Development => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .init();
        }
    }
}
