//! Request dispatch.
//!
//! Takes raw statement text through validation and classification, then
//! routes it to the read or write path of the [`ConnectionManager`] and
//! shapes the outcome as a [`GatewayResponse`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::backend::ConnectionManager;
use crate::error::{GatewayError, GatewayResult};
use crate::validator::{QueryKind, QueryValidator};
use crate::value::ResultSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Health probe answered.
    Ok,
    /// Statement executed.
    Success,
    Error,
}

/// The JSON envelope for every response.
///
/// At most one of `data`, `rows_affected` and `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResultSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GatewayResponse {
    fn with_status(status: ResponseStatus) -> Self {
        Self {
            status,
            data: None,
            rows_affected: None,
            error: None,
        }
    }

    /// Rows from a read. An empty result still carries `data: []`.
    pub fn rows(data: ResultSet) -> Self {
        Self {
            data: Some(data),
            ..Self::with_status(ResponseStatus::Success)
        }
    }

    pub fn affected(count: u64) -> Self {
        Self {
            rows_affected: Some(count),
            ..Self::with_status(ResponseStatus::Success)
        }
    }

    pub fn ok() -> Self {
        Self::with_status(ResponseStatus::Ok)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::with_status(ResponseStatus::Error)
        }
    }
}

/// Routes statements to the backend.
#[derive(Debug)]
pub struct Dispatcher {
    manager: Arc<ConnectionManager>,
    validator: QueryValidator,
    health_timeout: Duration,
}

impl Dispatcher {
    pub fn new(manager: Arc<ConnectionManager>, validator: QueryValidator, health_timeout: Duration) -> Self {
        Self {
            manager,
            validator,
            health_timeout,
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn validator(&self) -> &QueryValidator {
        &self.validator
    }

    /// Validate, classify and execute one statement.
    ///
    /// Nothing reaches the backend unless validation passes and the statement
    /// classifies as a read or a write.
    pub async fn handle(&self, sql: &str) -> GatewayResult<GatewayResponse> {
        if sql.trim().is_empty() {
            return Err(GatewayError::EmptyQuery);
        }

        let kind = self.validator.check(sql).inspect_err(|e| {
            tracing::info!("Rejected statement: {}", e);
        })?;

        match kind {
            QueryKind::Read => {
                let rows = self.manager.execute_read(sql).await.inspect_err(|e| {
                    tracing::error!("Read failed: {}", e);
                })?;
                tracing::debug!("Read returned {} rows", rows.len());
                Ok(GatewayResponse::rows(rows))
            }
            QueryKind::Write => {
                let count = self.manager.execute_write(sql).await.inspect_err(|e| {
                    tracing::error!("Write failed: {}", e);
                })?;
                tracing::debug!("Write affected {} rows", count);
                Ok(GatewayResponse::affected(count))
            }
            QueryKind::Unknown => {
                tracing::info!("Rejected statement: unknown query type");
                Err(GatewayError::UnknownQueryType)
            }
        }
    }

    /// Probe the backend. Never executes a caller statement.
    pub async fn health(&self) -> GatewayResult<GatewayResponse> {
        self.manager.ping(self.health_timeout).await.inspect_err(|e| {
            tracing::warn!("Health check failed: {}", e);
        })?;
        Ok(GatewayResponse::ok())
    }
}
