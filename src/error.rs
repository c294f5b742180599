//! Error types for sqlgate.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::dispatcher::GatewayResponse;
use crate::validator::ValidationError;

/// The main error type for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Invalid backend kind, ports or required fields. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The backend could not be reached or did not answer the liveness probe.
    #[error("{0}")]
    Connectivity(String),

    /// The submitted statement was empty or whitespace only.
    #[error("Query is empty")]
    EmptyQuery,

    /// The request body was not the expected JSON document.
    #[error("Invalid request body")]
    InvalidBody,

    /// The statement was rejected by the validator.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The statement's leading keyword is neither a read nor a write.
    #[error("Unknown query type")]
    UnknownQueryType,

    /// The backend rejected or failed the statement.
    #[error("{0}")]
    Execution(String),
}

impl GatewayError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::EmptyQuery
            | Self::InvalidBody
            | Self::Validation(_)
            | Self::UnknownQueryType => StatusCode::BAD_REQUEST,
            Self::Execution(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller, not the gateway or the backend, is at fault.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(GatewayResponse::error(self.to_string()))).into_response()
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
