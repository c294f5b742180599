//! sqlgate: SQL over HTTP
//!
//! # Usage
//!
//! ```bash
//! # First run: answer a few questions
//! sqlgate --setup
//!
//! # From a config file
//! sqlgate --config /etc/sqlgate.toml
//!
//! # Straight from flags
//! sqlgate --db-type postgres --db-host db --db-user app --db-name shop -p 8080
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use colored::*;
use tracing_subscriber::EnvFilter;

use sqlgate::config::{BackendSection, ConfigFile, Overrides, default_config_path};
use sqlgate::{BackendKind, Gateway, GatewayConfig};

#[derive(Parser)]
#[command(name = "sqlgate")]
#[command(version)]
#[command(about = "One HTTP endpoint in front of PostgreSQL, MySQL, SQLite or SQL Server", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqlgate --setup
    sqlgate --config ./sqlgate.toml --port 9090
    sqlgate --db-type sqlite --db-name ./app.db")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "SQLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Run the interactive setup even if a config is available
    #[arg(long)]
    setup: bool,

    /// Database type: postgres, mysql, sqlite or mssql
    #[arg(long, env = "SQLGATE_DB_TYPE")]
    db_type: Option<BackendKind>,

    /// Database host
    #[arg(long, env = "SQLGATE_DB_HOST")]
    db_host: Option<String>,

    /// Database port (defaults to the backend's usual port)
    #[arg(long, env = "SQLGATE_DB_PORT")]
    db_port: Option<u16>,

    /// Database user
    #[arg(long, env = "SQLGATE_DB_USER")]
    db_user: Option<String>,

    /// Database password
    #[arg(long, env = "SQLGATE_DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    /// Database name, or file path for SQLite
    #[arg(long, env = "SQLGATE_DB_NAME")]
    db_name: Option<String>,

    /// Port the HTTP service listens on
    #[arg(short, long, env = "SQLGATE_PORT")]
    port: Option<u16>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "SQLGATE_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            backend: BackendSection {
                kind: self.db_type,
                host: self.db_host.clone(),
                port: self.db_port,
                user: self.db_user.clone(),
                password: self.db_password.clone(),
                database: self.db_name.clone(),
            },
            service_port: self.port,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sqlgate=info,tower_http=info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

/// Pick the configuration source: the wizard when asked for, then a config
/// file, then bare flags, then the wizard again if someone is at the
/// terminal.
fn resolve_config(cli: &Cli) -> anyhow::Result<GatewayConfig> {
    if cli.setup {
        return Ok(sqlgate::wizard::run()?);
    }

    let file_path = cli
        .config
        .clone()
        .or_else(|| default_config_path().filter(|p| p.is_file()));

    if let Some(path) = file_path {
        tracing::info!("Loading configuration from {}", path.display());
        let file = ConfigFile::load(&path)?;
        return Ok(file.resolve(cli.overrides())?);
    }

    if cli.db_type.is_some() {
        return Ok(ConfigFile::default().resolve(cli.overrides())?);
    }

    if std::io::stdin().is_terminal() {
        return Ok(sqlgate::wizard::run()?);
    }

    bail!("no configuration found: pass --config, --db-type or run with --setup")
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Err(e) = run(&cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = resolve_config(cli)?;

    let mut gateway = Gateway::new(config);
    gateway
        .init()
        .await
        .context("failed to start the gateway")?;
    gateway.serve().await?;
    Ok(())
}
