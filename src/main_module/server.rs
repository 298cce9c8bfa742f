use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use crate::api_router::create_router;
use crate::config::AppConfig;
use crate::core::shared::state::AppState;

use super::shutdown_signal;

pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let addr = config.bind_address();
    if config.environment.is_development() {
        info!("Running in development mode");
    }

    tokio::fs::create_dir_all(&config.uploads.dir)
        .await
        .with_context(|| format!("Failed to create upload directory {}", config.uploads.dir.display()))?;

    let state = Arc::new(AppState::build(config)?);
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(addr.as_str()).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {} - is another instance running?", addr, e);
            return Err(e.into());
        }
    };
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}
