//! HTTP and WebSocket front end for the interleave agent.
//!
//! Routes:
//! - `POST {base}/chat/stream` - SSE turn stream
//! - `GET /ws` - WebSocket chat
//! - `GET {base}/health`, `GET {base}/tools`, `GET {base}/agent/info`

pub mod routes;
mod state;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

pub use routes::create_router;
pub use state::AppState;

/// Binds `host:port` and serves until the process exits.
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run(state: AppState, host: &str, port: u16) -> Result<()> {
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    let base_path = state.base_path().to_string();
    let app = create_router(state);
    serve(listener, app, &base_path).await
}

/// Serves `app` on an already bound listener.
///
/// # Errors
/// Returns an error if the server fails.
pub async fn serve(listener: TcpListener, app: Router, base_path: &str) -> Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    info!(%addr, "server listening");
    info!("websocket available at ws://{addr}/ws");
    info!("streaming API available at http://{addr}{base_path}/chat/stream");

    axum::serve(listener, app).await.context("Server error")
}
