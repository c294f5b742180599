//! # sqlgate
//!
//! One HTTP endpoint in front of PostgreSQL, MySQL, SQLite or SQL Server.
//!
//! ## Architecture
//!
//! ```text
//! POST /query {"query": "..."}
//!   → validator (denylist, system procedures)
//!   → classifier (READ / WRITE / UNKNOWN)
//!   → connection manager (one pool per process)
//!   → {"status": "success", "data": [...]} | {"status": "success", "rows_affected": n}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sqlgate::{BackendKind, Gateway, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GatewayConfig::with_defaults(BackendKind::Sqlite, "app.db");
//!     let mut gateway = Gateway::new(config);
//!     gateway.init().await?;
//!     gateway.serve().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod router;
pub mod server;
pub mod validator;
pub mod value;
pub mod wizard;

pub use backend::ConnectionManager;
pub use config::{BackendConfig, BackendKind, GatewayConfig, PoolSettings};
pub use dispatcher::{Dispatcher, GatewayResponse};
pub use error::{GatewayError, GatewayResult};
pub use router::create_router;
pub use server::{Gateway, GatewayState};
pub use validator::{QueryKind, QueryValidator, classify};
pub use value::{ResultSet, Row, SqlValue};
