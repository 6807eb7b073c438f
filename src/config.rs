use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::utils::RetryConfig;

// ============================================================================
// Configuration
// ============================================================================
//
// Loaded from environment variables with defaults. Without DATABASE_URL the
// service runs on the in-memory store.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub database: Option<DatabaseConfig>,
    pub server: ServerConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = match lookup("DATABASE_URL").filter(|url| !url.is_empty()) {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            }),
            None => None,
        };

        let server = ServerConfig {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3001)?,
            metrics_port: parse_or(&lookup, "METRICS_PORT", 9090)?,
        };

        let max_attempts: u32 = parse_or(&lookup, "REGISTER_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            anyhow::bail!("REGISTER_MAX_ATTEMPTS must be at least 1");
        }

        let retry = RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(parse_or(&lookup, "REGISTER_RETRY_DELAY_MS", 50)?),
            ..RetryConfig::default()
        };

        Ok(Self {
            database,
            server,
            retry,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}
