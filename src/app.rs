use axum::Router;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::routes::{record_routes, system_routes};
use crate::state::AppState;

/// Build the complete Axum application:
/// - /ping                 (liveness + version)
/// - /record, /record/output
/// - /records              (most recent, paginated)
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(system_routes::routes())
        .merge(record_routes::routes())
        .with_state(state)

        // Logging middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
