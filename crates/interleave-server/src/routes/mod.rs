//! Router assembly.

pub mod chat;
pub mod health;
pub mod ws;

use axum::Router;
use axum::http::{Method, header};
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the router with every endpoint under the configured base path.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let base = state.base_path().to_string();

    Router::new()
        .route(&format!("{base}/chat/stream"), post(chat::chat_stream))
        .route("/ws", get(ws::ws_handler))
        .route(&format!("{base}/health"), get(health::health))
        .route(&format!("{base}/tools"), get(health::tools))
        .route(&format!("{base}/agent/info"), get(health::agent_info))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
