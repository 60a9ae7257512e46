use std::sync::Arc;

use clap::Parser;
use object_store::local::LocalFileSystem;
use tracing_subscriber::EnvFilter;

use volpyramid::config::ServiceConfig;
use volpyramid::http::{router, AppState};
use volpyramid::storage::ObjectStoreBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::parse();
    config.validate().map_err(anyhow::Error::msg)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    std::fs::create_dir_all(&config.data_dir)?;
    let backend = LocalFileSystem::new_with_prefix(&config.data_dir)?;
    let storage = Arc::new(ObjectStoreBackend::new(Arc::new(backend)));

    let state = AppState { storage };
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install ctrl-c handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
