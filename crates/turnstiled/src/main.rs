use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use turnstile_core::{FaceIdentifier, OnnxFaceEncoder, Registry};
use turnstiled::config::Config;
use turnstiled::engine::spawn_engine;
use turnstiled::http::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    tracing::info!(
        addr = %config.listen_addr,
        registry = %config.registry_path.display(),
        history = %config.history_dir.display(),
        tolerance = config.tolerance,
        "turnstiled starting"
    );

    let registry = Registry::load(&config.registry_path)?;
    let identities = registry.len();

    let encoder = OnnxFaceEncoder::load(&config.model_dir)
        .with_context(|| format!("loading ONNX models from {}", config.model_dir.display()))?;
    let identifier = FaceIdentifier::new(registry, config.tolerance, &config.history_dir)?;

    let state = AppState {
        engine: spawn_engine(Box::new(encoder), identifier),
        tolerance: config.tolerance,
        identities,
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "turnstiled listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("turnstiled shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
