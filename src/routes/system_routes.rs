use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ping", get(ping))
}

/// GET /ping
/// Unauthenticated liveness check, reports the server version.
async fn ping(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "pong",
        "version": state.config.server_version,
    }))
}
