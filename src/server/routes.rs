//! Router configuration for the file server.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/record/:recid/files/:name", get(handlers::serve_record_file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
