//! Server entry point.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::routes::{router, AppState};

/// Binds the listener and serves sync requests until the task is dropped.
pub async fn serve(config: ServerConfig) -> ServerResult<()> {
    let state = AppState::new(&config);
    serve_with_state(config, state).await
}

/// Serves sync requests over pre-built state (useful when the store is
/// shared with other components).
pub async fn serve_with_state(config: ServerConfig, state: AppState) -> ServerResult<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "sync server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
