use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use limiter_core::{LimitTable, OperationClass};
use thiserror::Error;

static BIND_ADDR_DEFAULT: &str = "127.0.0.1:3000";
static UPSTREAM_BASE_URL_DEFAULT: &str = "http://127.0.0.1:8000";
static BUCKET_TTL_SECS_DEFAULT: u64 = 600;

/// Startup configuration, read once from the environment.
///
/// Per-class budget overrides use `<CLASS>_MAX_REQUESTS` and
/// `<CLASS>_WINDOW_MS` (e.g. `READ_MAX_REQUESTS=200`); anything left unset
/// keeps the shipped table's value. The merged table must still pass
/// validation or the server refuses to boot.
#[derive(Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub upstream_base_url: String,
    pub bucket_ttl: Duration,
    pub limits: LimitTable,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid number in {0}")]
    InvalidNumber(String),

    #[error("invalid bind address: {0}")]
    InvalidBindAddr(String),

    #[error(transparent)]
    Limits(#[from] limiter_core::ConfigError),
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_addr = read_string("BIND_ADDR", BIND_ADDR_DEFAULT);
        let bind_addr = raw_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(raw_addr))?;

        let limits = read_limits(LimitTable::default())?;
        limits.validate()?;

        Ok(Self {
            bind_addr,
            upstream_base_url: read_string("UPSTREAM_BASE_URL", UPSTREAM_BASE_URL_DEFAULT),
            bucket_ttl: Duration::from_secs(read_u64("BUCKET_TTL_SECS", BUCKET_TTL_SECS_DEFAULT)?),
            limits,
        })
    }
}

fn read_limits(mut limits: LimitTable) -> Result<LimitTable, ConfigError> {
    for class in OperationClass::ALL {
        let prefix = class.as_str().to_uppercase();
        let entry = limits.get_mut(class);

        if let Some(max_requests) = read_opt_u32(&format!("{prefix}_MAX_REQUESTS"))? {
            entry.max_requests = max_requests;
        }
        if let Some(window_ms) = read_opt_u64(&format!("{prefix}_WINDOW_MS"))? {
            entry.window = Duration::from_millis(window_ms);
        }
    }

    Ok(limits)
}

fn read_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn read_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn read_opt_u32(key: &str) -> Result<Option<u32>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber(key.to_string())),
        Err(_) => Ok(None),
    }
}

fn read_opt_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber(key.to_string())),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_form_a_valid_config() {
        // No overrides: the shipped table and defaults must boot.
        let config = ServerConfig::from_env().expect("default config is valid");

        assert_eq!(config.bucket_ttl, Duration::from_secs(600));
        assert!(config.bucket_ttl >= config.limits.read.window);
        assert_eq!(config.limits, LimitTable::default());
    }
}
