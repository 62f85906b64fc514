//! Serve command - load the model in the background and serve HTTP.

use std::sync::Arc;

use clap::Args;
use tokio::net::TcpListener;
use tracing::{error, info};

use recibo_core::{CommandBackend, ExtractionService, VisionBackend};

use super::config::load_config;
use crate::routes;

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Bind address (overrides MLX_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides MLX_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Model identifier (overrides MLX_MODEL)
    #[arg(short, long)]
    model: Option<String>,
}

pub async fn run(args: ServeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(model) = args.model {
        config.model.model_id = model;
    }

    let service = Arc::new(ExtractionService::new(&config)?);

    // /health answers with ready=false until this finishes.
    let loader = Arc::clone(&service);
    let spec = config.model.command_spec();
    tokio::task::spawn_blocking(move || {
        let loaded = loader.load_with(|| {
            CommandBackend::load(spec).map(|b| Box::new(b) as Box<dyn VisionBackend>)
        });
        if let Err(e) = loaded {
            error!("Model failed to load, /extract will answer 503: {}", e);
        }
    });

    let app = routes::router(service, &config.server)?;
    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    let addr = listener.local_addr()?;

    info!(
        "Starting receipt OCR sidecar on {} (ocr-only mode, model {})",
        addr, config.model.model_id
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down receipt OCR sidecar");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
