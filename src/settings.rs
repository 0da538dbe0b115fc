//! Process settings from environment variables (a `.env` file is loaded by the binary).

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/donut_shop";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    /// Request body limit in bytes.
    pub body_limit: usize,
    /// Schema config JSON; the bundled one when unset.
    pub config_path: Option<PathBuf>,
    /// Overrides the PostgreSQL schema named in the config.
    pub schema: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::Setting {
            name: "BIND_ADDR",
            message: format!("not a socket address: {}", bind_raw),
        })?;
        let max_connections = match var("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| ConfigError::Setting {
                name: "DATABASE_MAX_CONNECTIONS",
                message: format!("expected a positive integer, got {}", v),
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        let body_limit = match var("REQUEST_BODY_LIMIT") {
            Some(v) => v.parse::<usize>().map_err(|_| ConfigError::Setting {
                name: "REQUEST_BODY_LIMIT",
                message: format!("expected a byte count, got {}", v),
            })?,
            None => DEFAULT_BODY_LIMIT,
        };

        Ok(Settings {
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            bind_addr,
            max_connections,
            body_limit,
            config_path: var("CONFIG_PATH").map(PathBuf::from),
            schema: var("DONUTS_SCHEMA"),
        })
    }
}
