//! The Voxgate gateway: WebSocket endpoint, connection handling, and the
//! conductor that drives multi-turn dialogues between clients and the
//! model provider.

pub mod cli;
pub mod conductor;
pub mod connections;
pub mod state;
pub mod ws;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the HTTP router: the WebSocket endpoint plus a liveness probe.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::client_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}
