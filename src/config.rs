//! Configuration loader for the `hidroflow` backend service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Push gateway base URL.
    pub push_gateway_url: String,

    /// Per-request timeout for gateway calls (submit and receipt fetch).
    pub push_timeout: Duration,

    /// Delay between ticket issuance and the first receipt query.
    pub receipt_delay: Duration,

    /// Maximum ticket ids per receipt query.
    pub receipt_batch_size: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `PUSH_GATEWAY_URL` – push gateway base URL (default: `https://exp.host`)
/// - `PUSH_TIMEOUT_SECS` – gateway request timeout (default: 10)
/// - `PUSH_RECEIPT_DELAY_SECS` – wait before fetching receipts (default: 15)
/// - `PUSH_RECEIPT_BATCH_SIZE` – ids per receipt query (default: 300)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let push_gateway_url =
        env::var("PUSH_GATEWAY_URL").unwrap_or_else(|_| "https://exp.host".to_string());
    let push_timeout = Duration::from_secs(parse_env_u32!("PUSH_TIMEOUT_SECS", 10) as u64);
    let receipt_delay = Duration::from_secs(parse_env_u32!("PUSH_RECEIPT_DELAY_SECS", 15) as u64);
    let receipt_batch_size = parse_env_u32!("PUSH_RECEIPT_BATCH_SIZE", 300);

    Ok(Config {
        db_url,
        db_pool_max,
        push_gateway_url,
        push_timeout,
        receipt_delay,
        receipt_batch_size,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        // Mask the password in the database URL for security
        let masked_db_url = if let Some(at_pos) = self.db_url.rfind('@') {
            if let Some(colon_pos) = self.db_url[..at_pos].rfind(':') {
                format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                )
            } else {
                self.db_url.clone()
            }
        } else {
            self.db_url.clone()
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL             : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX              : {}", self.db_pool_max);
        tracing::info!("  PUSH_GATEWAY_URL         : {}", self.push_gateway_url);
        tracing::info!("  PUSH_TIMEOUT_SECS        : {}", self.push_timeout.as_secs());
        tracing::info!("  PUSH_RECEIPT_DELAY_SECS  : {}", self.receipt_delay.as_secs());
        tracing::info!("  PUSH_RECEIPT_BATCH_SIZE  : {}", self.receipt_batch_size);
    }
}
