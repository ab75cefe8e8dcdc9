//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use stationlend_observability::LogFormat;

pub const BIND_ADDR_VAR: &str = "STATIONLEND_BIND_ADDR";
pub const ADMIN_TOKEN_VAR: &str = "STATIONLEND_ADMIN_TOKEN";
pub const LOG_FORMAT_VAR: &str = "STATIONLEND_LOG_FORMAT";
pub const RECONCILE_INTERVAL_VAR: &str = "STATIONLEND_RECONCILE_INTERVAL_SECS";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_ADMIN_TOKEN: &str = "dev-admin-token";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Bearer token for platform administration routes.
    pub admin_token: String,
    pub log_format: LogFormat,
    /// When set, the binary verifies every tenant on this interval.
    pub reconcile_interval: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_raw = lookup(BIND_ADDR_VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse()
            .map_err(|e| ConfigError::invalid(BIND_ADDR_VAR, &bind_raw, e))?;

        let admin_token = match lookup(ADMIN_TOKEN_VAR) {
            Some(token) if token.trim().is_empty() => {
                return Err(ConfigError::invalid(ADMIN_TOKEN_VAR, &token, "empty token"));
            }
            Some(token) => token,
            None => {
                tracing::warn!("{ADMIN_TOKEN_VAR} not set; using insecure dev default");
                DEV_ADMIN_TOKEN.to_string()
            }
        };

        let log_format = match lookup(LOG_FORMAT_VAR) {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::invalid(LOG_FORMAT_VAR, &raw, e))?,
            None => LogFormat::default(),
        };

        let reconcile_interval = match lookup(RECONCILE_INTERVAL_VAR) {
            None => None,
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|e| ConfigError::invalid(RECONCILE_INTERVAL_VAR, &raw, e))?;
                if secs == 0 {
                    return Err(ConfigError::invalid(
                        RECONCILE_INTERVAL_VAR,
                        &raw,
                        "interval must be at least one second",
                    ));
                }
                Some(Duration::from_secs(secs))
            }
        };

        Ok(Self {
            bind_addr,
            admin_token,
            log_format,
            reconcile_interval,
        })
    }
}
