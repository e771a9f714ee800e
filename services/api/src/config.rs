//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::FixedOffset;
use std::net::SocketAddr;
use tracing::Level;
use weight_tracker_core::forecast::DEFAULT_HORIZON_DAYS;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where weight records and identities are persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    /// Process-local maps; contents are lost on restart.
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store: StoreBackend,
    pub log_level: Level,
    /// The two identities allowed to register and log in, in chart order.
    pub identities: [String; 2],
    /// The timezone every timestamp is expressed in.
    pub reference_offset: FixedOffset,
    pub forecast_horizon_days: u32,
    pub session_timeout_minutes: i64,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Load Server Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Load Store Settings ---
        let backend = lookup("STORE_BACKEND").unwrap_or_else(|| "postgres".to_string());
        let store = match backend.to_lowercase().as_str() {
            "postgres" => StoreBackend::Postgres {
                database_url: lookup("DATABASE_URL")
                    .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?,
            },
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORE_BACKEND".to_string(),
                    format!("'{}' is not one of postgres, memory", other),
                ))
            }
        };

        // --- Load Application Settings ---
        let identities_str = lookup("USER_IDENTITIES")
            .ok_or_else(|| ConfigError::MissingVar("USER_IDENTITIES".to_string()))?;
        let identities = parse_identities(&identities_str)?;

        let reference_offset = match lookup("REFERENCE_UTC_OFFSET") {
            Some(raw) => raw.parse::<FixedOffset>().map_err(|e| {
                ConfigError::InvalidValue("REFERENCE_UTC_OFFSET".to_string(), e.to_string())
            })?,
            None => FixedOffset::east_opt(9 * 3600).ok_or_else(|| {
                ConfigError::InvalidValue("REFERENCE_UTC_OFFSET".to_string(), "+09:00".to_string())
            })?,
        };

        let forecast_horizon_days =
            parse_positive(&lookup, "FORECAST_HORIZON_DAYS", i64::from(DEFAULT_HORIZON_DAYS))?;
        let forecast_horizon_days = u32::try_from(forecast_horizon_days).map_err(|e| {
            ConfigError::InvalidValue("FORECAST_HORIZON_DAYS".to_string(), e.to_string())
        })?;
        let session_timeout_minutes = parse_positive(&lookup, "SESSION_TIMEOUT_MINUTES", 30)?;

        Ok(Self {
            bind_address,
            store,
            log_level,
            identities,
            reference_offset,
            forecast_horizon_days,
            session_timeout_minutes,
            cors_origin,
        })
    }

    /// Whether `identity` is one of the two configured users.
    pub fn is_known_identity(&self, identity: &str) -> bool {
        self.identities.iter().any(|known| known == identity)
    }
}

fn parse_identities(raw: &str) -> Result<[String; 2], ConfigError> {
    let names: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    match <[String; 2]>::try_from(names) {
        Ok([first, second]) if first != second => Ok([first, second]),
        _ => Err(ConfigError::InvalidValue(
            "USER_IDENTITIES".to_string(),
            format!("expected two distinct comma-separated names, got '{}'", raw),
        )),
    }
}

fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: i64,
) -> Result<i64, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{}' is not a positive integer", raw),
        )),
    }
}
