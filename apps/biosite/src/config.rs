//! # Server Configuration
//!
//! Settings are resolved in three layers, later layers winning:
//!
//! 1. An optional TOML file (`--config biosite.toml`)
//! 2. `BIOSITE_*` environment variables
//! 3. CLI flags (applied by the `cli` module)
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! database = "/var/lib/biosite/site.redb"
//! cors_origins = "https://example.com,https://www.example.com"
//! rate_limit = 100
//! session_ttl_hours = 24
//! allow_registration = false
//! ```
//!
//! ## Environment Variables
//!
//! | variable | field |
//! |---|---|
//! | `BIOSITE_HOST` | `host` |
//! | `BIOSITE_PORT` | `port` |
//! | `BIOSITE_DB` | `database` |
//! | `BIOSITE_CORS_ORIGINS` | `cors_origins` (`*`, or comma-separated list) |
//! | `BIOSITE_RATE_LIMIT` | `rate_limit` (requests/second, 0 disables) |
//! | `BIOSITE_SESSION_TTL_HOURS` | `session_ttl_hours` (1 to 8784) |
//! | `BIOSITE_ALLOW_REGISTRATION` | `allow_registration` |
//! | `BIOSITE_PASSWORD_ROUNDS` | `password_rounds` |

use biosite_core::{
    Authenticator, DEFAULT_SESSION_TTL_HOURS, MAX_SESSION_TTL_HOURS, PasswordHasher,
    session_ttl_from_hours,
};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default rate limit: 100 requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Resolved server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database: PathBuf,
    /// `None` allows localhost origins only.
    pub cors_origins: Option<String>,
    pub rate_limit: u32,
    pub session_ttl_hours: i64,
    /// Whether `POST /auth/register` is open to the public.
    pub allow_registration: bool,
    pub password_rounds: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database: PathBuf::from("biosite.redb"),
            cors_origins: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            allow_registration: false,
            password_rounds: PasswordHasher::DEFAULT_ROUNDS,
        }
    }
}

impl ServerConfig {
    /// Load the file at `path` (if any), then apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env(|var| std::env::var(var).ok())
    }

    /// Parse a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.checked()
    }

    /// Override fields from environment variables, read through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("BIOSITE_HOST") {
            self.host = host;
        }
        if let Some(port) = get("BIOSITE_PORT") {
            self.port = parse_var("BIOSITE_PORT", &port)?;
        }
        if let Some(database) = get("BIOSITE_DB") {
            self.database = PathBuf::from(database);
        }
        if let Some(origins) = get("BIOSITE_CORS_ORIGINS") {
            self.cors_origins = Some(origins);
        }
        if let Some(limit) = get("BIOSITE_RATE_LIMIT") {
            self.rate_limit = parse_var("BIOSITE_RATE_LIMIT", &limit)?;
        }
        if let Some(ttl) = get("BIOSITE_SESSION_TTL_HOURS") {
            self.session_ttl_hours = parse_var("BIOSITE_SESSION_TTL_HOURS", &ttl)?;
        }
        if let Some(allow) = get("BIOSITE_ALLOW_REGISTRATION") {
            self.allow_registration = parse_bool("BIOSITE_ALLOW_REGISTRATION", &allow)?;
        }
        if let Some(rounds) = get("BIOSITE_PASSWORD_ROUNDS") {
            self.password_rounds = parse_var("BIOSITE_PASSWORD_ROUNDS", &rounds)?;
        }
        self.checked()
    }

    /// Reject values that would fail later at request time.
    fn checked(self) -> Result<Self, ConfigError> {
        if session_ttl_from_hours(self.session_ttl_hours).is_none() {
            return Err(ConfigError::OutOfRange {
                field: "session_ttl_hours",
                value: self.session_ttl_hours,
                min: 1,
                max: MAX_SESSION_TTL_HOURS,
            });
        }
        Ok(self)
    }

    /// `host:port`, ready for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Account service with this config's hashing cost and session lifetime.
    pub fn authenticator(&self) -> Authenticator {
        Authenticator::new(
            PasswordHasher::new(self.password_rounds),
            session_ttl_from_hours(self.session_ttl_hours)
                .unwrap_or_else(|| TimeDelta::hours(DEFAULT_SESSION_TTL_HOURS)),
        )
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var,
            value: value.to_string(),
        }),
    }
}

// =============================================================================
// TESTS
// =============================================================================
