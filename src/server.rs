//! Gateway server.

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::backend::ConnectionManager;
use crate::config::GatewayConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{GatewayError, GatewayResult};
use crate::router::create_router;
use crate::validator::QueryValidator;

/// Shared state for the gateway.
#[derive(Debug)]
pub struct GatewayState {
    pub dispatcher: Dispatcher,
    pub config: GatewayConfig,
}

impl GatewayState {
    /// Build the state around an already connected (or deliberately
    /// unconnected) manager.
    pub fn new(config: GatewayConfig, manager: Arc<ConnectionManager>) -> Self {
        let validator = QueryValidator::with_denied_keywords(&config.denied_keywords);
        let dispatcher = Dispatcher::new(manager, validator, config.health_timeout);
        Self { dispatcher, config }
    }
}

/// The SQL gateway server.
pub struct Gateway {
    config: GatewayConfig,
    state: Option<Arc<GatewayState>>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Validate the configuration and connect to the backend.
    pub async fn init(&mut self) -> GatewayResult<()> {
        self.config.validate()?;
        tracing::info!("Initializing sqlgate...");

        let manager = Arc::new(ConnectionManager::new(
            self.config.backend.clone(),
            self.config.pool.clone(),
        ));
        manager.connect(self.config.health_timeout).await?;

        let state = GatewayState::new(self.config.clone(), manager);
        tracing::info!(
            "Statement denylist: {}",
            state.dispatcher.validator().denied_keywords().collect::<Vec<_>>().join(", ")
        );
        self.state = Some(Arc::new(state));
        Ok(())
    }

    /// Serve until ctrl-c or SIGTERM, then close the pool.
    ///
    /// # Errors
    /// Returns error if the gateway was not initialized or the listener
    /// cannot bind.
    pub async fn serve(&self) -> GatewayResult<()> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| GatewayError::config("gateway not initialized, call init() first"))?;

        let router = create_router(Arc::clone(state));

        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| GatewayError::config(format!("failed to bind to {}: {}", addr, e)))?;

        tracing::info!("sqlgate listening on {}", addr);
        tracing::info!("   POST /query    - Execute a SQL statement");
        tracing::info!("   GET  /health   - Health check");

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        state.dispatcher.manager().close().await;

        served.map_err(|e| GatewayError::Connectivity(format!("server error: {}", e)))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down");
}
