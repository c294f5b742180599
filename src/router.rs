//! HTTP router.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::Level;

use crate::handler::{execute_query, health_check};
use crate::middleware::{LogResponse, cors_layer, short_circuit_options};
use crate::server::GatewayState;

/// Create the gateway router.
///
/// | Route | Handler |
/// |-------|---------|
/// | `POST /query` | [`execute_query`] |
/// | `GET /health` | [`health_check`] |
pub fn create_router(state: Arc<GatewayState>) -> Router {
    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(LogResponse);

    Router::new()
        .route("/health", get(health_check))
        .route("/query", post(execute_query))
        .layer(middleware::from_fn(short_circuit_options))
        .layer(trace)
        .layer(cors_layer())
        .with_state(state)
}
