//! Interactive first-run setup.
//!
//! Asks for the backend, its address and credentials, and the service port,
//! in that order. Every prompt but the password offers a default.

use colored::*;
use dialoguer::{Input, Password, Select, theme::ColorfulTheme};

use crate::config::{BackendKind, DEFAULT_HOST, DEFAULT_SERVICE_PORT, DEFAULT_USER, GatewayConfig};
use crate::error::{GatewayError, GatewayResult};

/// Everything the wizard collects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupAnswers {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub service_port: u16,
}

impl SetupAnswers {
    /// Fill the remaining settings with defaults and validate.
    pub fn into_config(self) -> GatewayResult<GatewayConfig> {
        let mut config = GatewayConfig::with_defaults(self.kind, self.database);
        config.backend.host = self.host;
        config.backend.port = self.port;
        config.backend.user = self.user;
        config.backend.secret = self.password;
        config.service_port = self.service_port;
        config.validate()?;
        Ok(config)
    }
}

fn aborted(e: dialoguer::Error) -> GatewayError {
    GatewayError::config(format!("setup aborted: {}", e))
}

fn non_zero_port(port: &u16) -> Result<(), &'static str> {
    if *port == 0 {
        Err("port must be between 1 and 65535")
    } else {
        Ok(())
    }
}

#[allow(clippy::ptr_arg)]
fn non_blank(value: &String) -> Result<(), &'static str> {
    if value.trim().is_empty() {
        Err("a value is required")
    } else {
        Ok(())
    }
}

/// Prompt for a complete configuration on the terminal.
pub fn run() -> GatewayResult<GatewayConfig> {
    let theme = ColorfulTheme::default();

    println!();
    println!("{}", "sqlgate setup".bold().cyan());
    println!("{}", "One HTTP endpoint in front of your database.".dimmed());
    println!();

    let labels: Vec<&str> = BackendKind::ALL.iter().map(|k| k.label()).collect();
    let choice = Select::with_theme(&theme)
        .with_prompt("Database type")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(aborted)?;
    let kind = BackendKind::ALL[choice];

    let answers = if kind == BackendKind::Sqlite {
        let database: String = Input::with_theme(&theme)
            .with_prompt("Database file")
            .default("sqlgate.db".to_string())
            .validate_with(non_blank)
            .interact_text()
            .map_err(aborted)?;

        SetupAnswers {
            kind,
            host: DEFAULT_HOST.to_string(),
            port: kind.default_port(),
            user: DEFAULT_USER.to_string(),
            password: String::new(),
            database,
            service_port: prompt_service_port(&theme)?,
        }
    } else {
        let host: String = Input::with_theme(&theme)
            .with_prompt("Host")
            .default(DEFAULT_HOST.to_string())
            .validate_with(non_blank)
            .interact_text()
            .map_err(aborted)?;
        let port: u16 = Input::with_theme(&theme)
            .with_prompt("Port")
            .default(kind.default_port())
            .validate_with(non_zero_port)
            .interact_text()
            .map_err(aborted)?;
        let user: String = Input::with_theme(&theme)
            .with_prompt("User")
            .default(DEFAULT_USER.to_string())
            .validate_with(non_blank)
            .interact_text()
            .map_err(aborted)?;
        let password = Password::with_theme(&theme)
            .with_prompt("Password")
            .allow_empty_password(true)
            .interact()
            .map_err(aborted)?;
        let database: String = Input::with_theme(&theme)
            .with_prompt("Database name")
            .validate_with(non_blank)
            .interact_text()
            .map_err(aborted)?;

        SetupAnswers {
            kind,
            host,
            port,
            user,
            password,
            database,
            service_port: prompt_service_port(&theme)?,
        }
    };

    let config = answers.into_config()?;
    print_summary(&config);
    Ok(config)
}

fn prompt_service_port(theme: &ColorfulTheme) -> GatewayResult<u16> {
    Input::with_theme(theme)
        .with_prompt("Service port")
        .default(DEFAULT_SERVICE_PORT)
        .validate_with(non_zero_port)
        .interact_text()
        .map_err(aborted)
}

fn print_summary(config: &GatewayConfig) {
    let backend = &config.backend;
    println!();
    println!("{} {}", "✓".green(), "Configuration complete".bold());
    println!("  {:<10} {}", "Backend:".dimmed(), backend.kind.label());
    if backend.kind != BackendKind::Sqlite {
        println!("  {:<10} {}:{}", "Server:".dimmed(), backend.host, backend.port);
        println!("  {:<10} {}", "User:".dimmed(), backend.user);
    }
    println!("  {:<10} {}", "Database:".dimmed(), backend.database);
    println!("  {:<10} {}", "Listen:".dimmed(), config.bind_address());
    println!();
}
