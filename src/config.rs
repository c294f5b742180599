//! Gateway configuration
//!
//! A [`GatewayConfig`] is resolved once at startup from, highest precedence
//! first: command-line / environment overrides, a TOML file, built-in
//! defaults. It is validated before anything connects and never changes
//! afterwards.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};
use crate::validator::DENIED_KEYWORDS;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_SERVICE_PORT: u16 = 8080;
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 5;

/// The four supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum BackendKind {
    Postgres,
    MySql,
    Sqlite,
    Mssql,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Postgres,
        BackendKind::MySql,
        BackendKind::Sqlite,
        BackendKind::Mssql,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::MySql => "mysql",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Mssql => "mssql",
        }
    }

    /// Human-readable product name.
    pub fn label(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "PostgreSQL",
            BackendKind::MySql => "MySQL",
            BackendKind::Sqlite => "SQLite",
            BackendKind::Mssql => "SQL Server",
        }
    }

    /// Default server port. SQLite has none; the value is a placeholder.
    pub fn default_port(&self) -> u16 {
        match self {
            BackendKind::Postgres => 5432,
            BackendKind::MySql => 3306,
            BackendKind::Sqlite => 5432,
            BackendKind::Mssql => 1433,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(BackendKind::Postgres),
            "mysql" => Ok(BackendKind::MySql),
            "sqlite" | "sqlite3" => Ok(BackendKind::Sqlite),
            "mssql" | "sqlserver" => Ok(BackendKind::Mssql),
            other => Err(GatewayError::config(format!(
                "unsupported database type: {}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Where and how to reach the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub secret: String,
    /// Database name; a file path (or `:memory:`) for SQLite.
    pub database: String,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

impl BackendConfig {
    /// A config with every field but the database name defaulted.
    pub fn with_defaults(kind: BackendKind, database: impl Into<String>) -> Self {
        Self {
            kind,
            host: DEFAULT_HOST.to_string(),
            port: kind.default_port(),
            user: DEFAULT_USER.to_string(),
            secret: String::new(),
            database: database.into(),
        }
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.host.trim().is_empty() {
            return Err(GatewayError::config("database host is required"));
        }
        if self.port == 0 {
            return Err(GatewayError::config(format!(
                "invalid database port: {}. Port must be between 1 and 65535",
                self.port
            )));
        }
        if self.user.trim().is_empty() {
            return Err(GatewayError::config("database user is required"));
        }
        if self.database.trim().is_empty() {
            return Err(GatewayError::config("database name is required"));
        }
        Ok(())
    }
}

/// Connection pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Ceiling on concurrently open connections.
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub idle_connections: u32,
    /// How long a caller waits for a free connection once the ceiling is hit.
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            idle_connections: 5,
            acquire_timeout_secs: 30,
        }
    }
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.max_connections == 0 {
            return Err(GatewayError::config("pool max_connections must be at least 1"));
        }
        if self.acquire_timeout_secs == 0 {
            return Err(GatewayError::config("pool acquire_timeout_secs must be at least 1"));
        }
        if self.idle_connections > self.max_connections {
            return Err(GatewayError::config(format!(
                "pool idle_connections ({}) exceeds max_connections ({})",
                self.idle_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

/// Fully resolved gateway configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub backend: BackendConfig,
    /// Port the HTTP service listens on.
    pub service_port: u16,
    pub pool: PoolSettings,
    pub denied_keywords: Vec<String>,
    pub health_timeout: Duration,
}

impl GatewayConfig {
    /// Defaults for everything but the backend kind and database name.
    pub fn with_defaults(kind: BackendKind, database: impl Into<String>) -> Self {
        Self {
            backend: BackendConfig::with_defaults(kind, database),
            service_port: DEFAULT_SERVICE_PORT,
            pool: PoolSettings::default(),
            denied_keywords: DENIED_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            health_timeout: Duration::from_secs(DEFAULT_HEALTH_TIMEOUT_SECS),
        }
    }

    /// Check every invariant. Called before the config reaches the connector.
    pub fn validate(&self) -> GatewayResult<()> {
        self.backend.validate()?;
        if self.service_port == 0 {
            return Err(GatewayError::config(format!(
                "invalid service port: {}. Port must be between 1 and 65535",
                self.service_port
            )));
        }
        self.pool.validate()?;
        if self.health_timeout.is_zero() {
            return Err(GatewayError::config("health_timeout_secs must be at least 1"));
        }
        if self.denied_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(GatewayError::config("denied keywords must not be blank"));
        }
        Ok(())
    }

    /// Bind address for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.service_port)
    }
}

/// Backend fields as they appear in a file or on the command line; every
/// field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendSection {
    pub kind: Option<BackendKind>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl BackendSection {
    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: BackendSection) -> Self {
        Self {
            kind: other.kind.or(self.kind),
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            user: other.user.or(self.user),
            password: other.password.or(self.password),
            database: other.database.or(self.database),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorSection {
    pub denied_keywords: Option<Vec<String>>,
}

/// The TOML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub service_port: Option<u16>,
    pub health_timeout_secs: Option<u64>,
    pub backend: BackendSection,
    pub pool: PoolSettings,
    pub validator: ValidatorSection,
}

impl ConfigFile {
    pub fn from_toml_str(content: &str) -> GatewayResult<Self> {
        toml::from_str(content).map_err(|e| GatewayError::config(e.to_string()))
    }

    pub fn load(path: &Path) -> GatewayResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply overrides, fill defaults and validate.
    pub fn resolve(self, overrides: Overrides) -> GatewayResult<GatewayConfig> {
        let backend = self.backend.merge(overrides.backend);
        let kind = backend
            .kind
            .ok_or_else(|| GatewayError::config("database type is required"))?;

        let mut config = GatewayConfig::with_defaults(kind, backend.database.unwrap_or_default());
        if let Some(host) = backend.host {
            config.backend.host = host;
        }
        if let Some(port) = backend.port {
            config.backend.port = port;
        }
        if let Some(user) = backend.user {
            config.backend.user = user;
        }
        if let Some(password) = backend.password {
            config.backend.secret = password;
        }
        if let Some(port) = overrides.service_port.or(self.service_port) {
            config.service_port = port;
        }
        if let Some(secs) = self.health_timeout_secs {
            config.health_timeout = Duration::from_secs(secs);
        }
        if let Some(keywords) = self.validator.denied_keywords {
            config.denied_keywords = keywords;
        }
        config.pool = self.pool;

        config.validate()?;
        Ok(config)
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub backend: BackendSection,
    pub service_port: Option<u16>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        *self == Overrides::default()
    }
}

/// `<config dir>/sqlgate/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sqlgate").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("postgres".parse::<BackendKind>().unwrap(), BackendKind::Postgres);
        assert_eq!("PostgreSQL".parse::<BackendKind>().unwrap(), BackendKind::Postgres);
        assert_eq!("mysql".parse::<BackendKind>().unwrap(), BackendKind::MySql);
        assert_eq!("sqlite3".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!("sqlserver".parse::<BackendKind>().unwrap(), BackendKind::Mssql);

        let err = "oracle".parse::<BackendKind>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: unsupported database type: oracle"
        );
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::with_defaults(BackendKind::MySql, "shop");
        assert_eq!(config.backend.host, "localhost");
        assert_eq!(config.backend.port, 3306);
        assert_eq!(config.backend.user, "root");
        assert_eq!(config.backend.secret, "");
        assert_eq!(config.service_port, 8080);
        assert_eq!(config.pool, PoolSettings::default());
        assert_eq!(config.denied_keywords.len(), DENIED_KEYWORDS.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_required_fields() {
        let mut config = GatewayConfig::with_defaults(BackendKind::Postgres, "");
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "invalid configuration: database name is required"
        );

        config.backend.database = "app".into();
        config.backend.host = " ".into();
        assert!(config.validate().is_err());

        config.backend.host = "db".into();
        config.backend.port = 0;
        assert!(config.validate().is_err());

        config.backend.port = 5432;
        config.backend.user = String::new();
        assert!(config.validate().is_err());

        config.backend.user = "app".into();
        config.service_port = 0;
        assert!(config.validate().is_err());

        config.service_port = 9000;
        config.pool.idle_connections = 20;
        assert!(config.validate().is_err());

        config.pool.idle_connections = 5;
        config.pool.acquire_timeout_secs = 0;
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "invalid configuration: pool acquire_timeout_secs must be at least 1"
        );

        config.pool.acquire_timeout_secs = 30;
        config.health_timeout = Duration::ZERO;
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "invalid configuration: health_timeout_secs must be at least 1"
        );

        config.health_timeout = Duration::from_secs(5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let mut backend = BackendConfig::with_defaults(BackendKind::Postgres, "app");
        backend.secret = "hunter2".into();
        let debug = format!("{:?}", backend);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_resolve_file() {
        let file = ConfigFile::from_toml_str(
            r#"
            service_port = 9090
            health_timeout_secs = 2

            [backend]
            kind = "postgresql"
            host = "db.internal"
            user = "gateway"
            password = "s3cret"
            database = "orders"

            [pool]
            max_connections = 4
            idle_connections = 2

            [validator]
            denied_keywords = ["DROP", "TRUNCATE"]
            "#,
        )
        .unwrap();

        let config = file.resolve(Overrides::default()).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Postgres);
        assert_eq!(config.backend.host, "db.internal");
        assert_eq!(config.backend.port, 5432);
        assert_eq!(config.backend.user, "gateway");
        assert_eq!(config.backend.secret, "s3cret");
        assert_eq!(config.service_port, 9090);
        assert_eq!(config.health_timeout, Duration::from_secs(2));
        assert_eq!(config.pool.max_connections, 4);
        assert_eq!(config.pool.acquire_timeout_secs, 30);
        assert_eq!(config.denied_keywords, vec!["DROP", "TRUNCATE"]);
    }

    #[test]
    fn test_overrides_win() {
        let file = ConfigFile::from_toml_str(
            r#"
            service_port = 9090
            [backend]
            kind = "mysql"
            database = "shop"
            port = 3307
            "#,
        )
        .unwrap();

        let overrides = Overrides {
            backend: BackendSection {
                kind: Some(BackendKind::Mssql),
                port: Some(14330),
                ..Default::default()
            },
            service_port: Some(7000),
        };

        let config = file.resolve(overrides).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Mssql);
        assert_eq!(config.backend.port, 14330);
        assert_eq!(config.backend.database, "shop");
        assert_eq!(config.service_port, 7000);
    }

    #[test]
    fn test_resolve_requires_kind() {
        let err = ConfigFile::default()
            .resolve(Overrides::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: database type is required"
        );
    }

    #[test]
    fn test_file_rejects_bad_values() {
        assert!(ConfigFile::from_toml_str("[backend]\nkind = \"oracle\"").is_err());
        assert!(ConfigFile::from_toml_str("[backend]\nport = 70000").is_err());
        assert!(ConfigFile::from_toml_str("[backend]\ncolour = \"red\"").is_err());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend]\nkind = \"sqlite\"\ndatabase = \"app.db\"\n").unwrap();

        let config = ConfigFile::load(&path)
            .unwrap()
            .resolve(Overrides::default())
            .unwrap();
        assert_eq!(config.backend.kind, BackendKind::Sqlite);
        assert_eq!(config.backend.database, "app.db");

        assert!(ConfigFile::load(&dir.path().join("missing.toml")).is_err());
    }
}
