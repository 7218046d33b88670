//! Process settings from the environment, and tracing setup.

use crate::error::ConfigError;
use std::net::SocketAddr;

pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub api_prefix: String,
    pub bind: SocketAddr,
    pub max_connections: u32,
    pub body_limit: usize,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Load(format!("{} has an invalid value '{}'", key, v))),
        _ => Ok(default),
    }
}

impl Settings {
    /// Read settings, loading `.env` first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Load("DATABASE_URL is not set".into()))?;
        Ok(Settings {
            database_url,
            api_prefix: std::env::var("TABLEKIT_API_PREFIX").unwrap_or_else(|_| "/api".into()),
            bind: env_or("TABLEKIT_BIND", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            max_connections: env_or("TABLEKIT_MAX_CONNECTIONS", 5)?,
            body_limit: env_or("TABLEKIT_BODY_LIMIT", DEFAULT_BODY_LIMIT)?,
        })
    }
}

/// Install a `tracing` subscriber filtered by `RUST_LOG`, falling back to `default_directive`.
pub fn init_tracing(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
