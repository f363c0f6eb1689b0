//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use domain::{AllocationPolicy, DEFAULT_MAX_ACTIVE_RESERVATIONS};
use notifications::{DEFAULT_QUEUE_CAPACITY, RetryPolicy};
use thiserror::Error;

/// A variable was set to a value that could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value '{value}' for {key}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL connection string (default: unset, in-memory store)
/// - `USER_DIRECTORY_PATH` — JSON file of exhibitor contact profiles (default: unset)
/// - `MAX_ACTIVE_RESERVATIONS` — per-user quota (default: `3`)
/// - `NOTIFY_MAX_ATTEMPTS` — confirmation delivery attempts (default: `3`)
/// - `NOTIFY_BACKOFF_MS` — delay before the first retry (default: `200`)
/// - `NOTIFY_QUEUE_CAPACITY` — pending confirmations buffered (default: `256`)
///
/// Unset or empty variables take the default; unparsable values are errors.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub user_directory_path: Option<PathBuf>,
    pub max_active_reservations: usize,
    pub notify_max_attempts: u32,
    pub notify_backoff_ms: u64,
    pub notify_queue_capacity: usize,
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn text(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.text(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| ConfigError {
                key: key.to_string(),
                value,
            }),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(lookup);
        let defaults = Self::default();
        Ok(Self {
            host: vars.text("HOST").unwrap_or(defaults.host),
            port: vars.parsed("PORT", defaults.port)?,
            log_level: vars.text("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: vars.text("DATABASE_URL"),
            user_directory_path: vars.text("USER_DIRECTORY_PATH").map(PathBuf::from),
            max_active_reservations: vars
                .parsed("MAX_ACTIVE_RESERVATIONS", defaults.max_active_reservations)?,
            notify_max_attempts: vars.parsed("NOTIFY_MAX_ATTEMPTS", defaults.notify_max_attempts)?,
            notify_backoff_ms: vars.parsed("NOTIFY_BACKOFF_MS", defaults.notify_backoff_ms)?,
            notify_queue_capacity: vars
                .parsed("NOTIFY_QUEUE_CAPACITY", defaults.notify_queue_capacity)?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the allocation limits for the engine.
    pub fn allocation_policy(&self) -> AllocationPolicy {
        AllocationPolicy {
            max_active_per_user: self.max_active_reservations,
        }
    }

    /// Returns the confirmation retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.notify_max_attempts,
            Duration::from_millis(self.notify_backoff_ms),
        )
    }

    /// Logs settings that move the service away from the published booking rules.
    pub fn warn_on_overrides(&self) {
        if self.max_active_reservations != DEFAULT_MAX_ACTIVE_RESERVATIONS {
            tracing::warn!(
                configured = self.max_active_reservations,
                standard = DEFAULT_MAX_ACTIVE_RESERVATIONS,
                "per-user reservation quota overridden"
            );
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            user_directory_path: None,
            max_active_reservations: DEFAULT_MAX_ACTIVE_RESERVATIONS,
            notify_max_attempts: 3,
            notify_backoff_ms: 200,
            notify_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
