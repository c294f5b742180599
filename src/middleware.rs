//! HTTP middleware: CORS, `OPTIONS` short-circuit and response logging.

use std::time::Duration;

use axum::{
    extract::Request,
    http::{
        HeaderName, Method, Response, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::Next,
    response::IntoResponse,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::OnResponse,
};
use tracing::Span;

/// How long browsers may cache a preflight answer.
pub const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Any origin, `GET`/`POST`, and the headers browsers send with JSON calls.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .max_age(PREFLIGHT_MAX_AGE)
}

/// Answer every `OPTIONS` request with an empty 200.
///
/// The CORS layer only handles real preflights (those carrying
/// `Access-Control-Request-Method`); this catches the rest.
pub async fn short_circuit_options(request: Request, next: Next) -> axum::response::Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(request).await
}

/// Logs each response at a level picked from its status: errors for 5xx,
/// warnings for 4xx, info otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogResponse;

impl<B> OnResponse<B> for LogResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, _span: &Span) {
        let status = response.status().as_u16();
        let latency_ms = latency.as_millis() as u64;

        if response.status().is_server_error() {
            tracing::error!(status, latency_ms, "request failed");
        } else if response.status().is_client_error() {
            tracing::warn!(status, latency_ms, "request rejected");
        } else {
            tracing::info!(status, latency_ms, "request completed");
        }
    }
}
