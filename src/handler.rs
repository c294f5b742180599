//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::Value;

use crate::dispatcher::GatewayResponse;
use crate::error::{GatewayError, GatewayResult};
use crate::server::GatewayState;

/// `POST /query` body.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
}

/// Malformed bodies answer with the gateway error envelope, not axum's
/// plain-text rejection. Only a JSON object is a request; derived
/// `Deserialize` would also take `["SELECT 1"]`.
fn parse_request(body: &[u8]) -> GatewayResult<QueryRequest> {
    let invalid = |e: serde_json::Error| {
        tracing::debug!("Rejected request body: {}", e);
        GatewayError::InvalidBody
    };

    match serde_json::from_slice::<Value>(body).map_err(invalid)? {
        value @ Value::Object(_) => serde_json::from_value(value).map_err(invalid),
        other => {
            tracing::debug!("Rejected request body: expected an object, got {}", other);
            Err(GatewayError::InvalidBody)
        }
    }
}

pub async fn execute_query(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> GatewayResult<Json<GatewayResponse>> {
    let request = parse_request(&body)?;
    tracing::info!("Executing query: {}", request.query);

    let response = state.dispatcher.handle(&request.query).await?;
    Ok(Json(response))
}

pub async fn health_check(State(state): State<Arc<GatewayState>>) -> Response {
    match state.dispatcher.health().await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, Json(GatewayResponse::error(e.to_string()))).into_response(),
    }
}
