use gateway::{AppState, GatewayConfig, GeminiChat, router};
use inference::{InferencePipeline, ModelStatus};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;

    let _telemetry = common::init_observability(
        "gateway",
        config.inference.otel_endpoint.as_deref(),
        config.inference.environment,
    )?;

    tracing::info!(config = ?config.inference, port = config.port, "Loaded configuration");

    std::fs::create_dir_all(&config.inference.output_dir)?;
    std::fs::create_dir_all(&config.temp_dir)?;

    let inference_config = config.inference.clone();
    let model = tokio::task::spawn_blocking(move || {
        ModelStatus::load_from_dir(
            &inference_config.weights_dir,
            inference_config.labels_path.as_deref(),
        )
    })
    .await?;

    if config.chat.api_key.is_none() {
        tracing::warn!("GOOGLE_API_KEY not set, /chat will fail until it is");
    }

    let state = AppState::new(
        model,
        InferencePipeline::from_config(&config.inference),
        GeminiChat::new(config.chat.clone())?,
        &config.inference.output_dir,
        &config.temp_dir,
    );
    let app = router(state, &config.static_dir, config.max_upload_bytes);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
