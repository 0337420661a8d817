//! whisper-stt-server: resource-aware async serving control plane for
//! Whisper speech-to-text, exposed over HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use whisper_stt_server::config::Args;
use whisper_stt_server::registry::ModelRegistry;
use whisper_stt_server::resources::ResourceManager;
use whisper_stt_server::service::SttService;
use whisper_stt_server::{http, logging};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args = Args::parse();

    let resources = Arc::new(ResourceManager::default());
    let registry = Arc::new(ModelRegistry::new(args.models_dir.clone(), args.model_base_url.clone()));
    let service = Arc::new(SttService::new(resources, registry));

    let state = http::AppState { service };
    let app = http::build_router(state);

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind to {}", args.bind))?;

    tracing::info!(addr = %args.bind, "whisper-stt-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("whisper-stt-server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {e}");
        return;
    }
    tracing::info!("received shutdown signal");
}
