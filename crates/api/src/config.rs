//! Application configuration

use std::time::Duration;

use billhook_billing::{BillingError, PaddleConfig};
use billhook_shared::PoolSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("Invalid Paddle configuration: {0}")]
    Paddle(#[from] BillingError),
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string
    pub database_url: String,
    /// Server bind address
    pub bind_address: String,
    /// Upper bound for handling one request
    pub request_timeout: Duration,
    pub pool: PoolSettings,
    /// Apply embedded migrations at startup
    pub run_migrations: bool,
    /// Emit JSON logs instead of the human-readable format
    pub log_json: bool,
    pub paddle: PaddleConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let request_timeout = Duration::from_secs(env_parse("REQUEST_TIMEOUT_SECS", 30)?);

        let pool = PoolSettings {
            max_connections: env_parse("DB_MAX_CONNECTIONS", 10)?,
            acquire_timeout: Duration::from_secs(env_parse("DB_ACQUIRE_TIMEOUT_SECS", 5)?),
        };

        let run_migrations = env_bool("RUN_MIGRATIONS", true)?;

        let log_json = std::env::var("LOG_FORMAT")
            .map(|v| v.trim().eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let paddle = PaddleConfig::from_env()?;

        Ok(Self {
            database_url,
            bind_address,
            request_timeout,
            pool,
            run_migrations,
            log_json,
            paddle,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn env_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value }),
        },
        Err(_) => Ok(default),
    }
}
