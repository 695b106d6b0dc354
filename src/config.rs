//! Process configuration.
//!
//! Every tunable in the pipeline lives in one [`ValidatorConfig`]. Values come
//! from [`Default`] and may be overridden with `EMAIL_GATEKEEPER_*` environment
//! variables (a `.env` file is honoured through `dotenv`).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "EMAIL_GATEKEEPER_DB_PATH";
pub const ENV_DATABASE_NAME: &str = "EMAIL_GATEKEEPER_DATABASE_NAME";
pub const ENV_POOL_SIZE: &str = "EMAIL_GATEKEEPER_POOL_SIZE";
pub const ENV_SUGGESTION_THRESHOLD: &str = "EMAIL_GATEKEEPER_SUGGESTION_THRESHOLD";
pub const ENV_LOOKUP_TIMEOUT_MS: &str = "EMAIL_GATEKEEPER_LOOKUP_TIMEOUT_MS";
pub const ENV_ALLOWED_TLDS: &str = "EMAIL_GATEKEEPER_ALLOWED_TLDS";
pub const ENV_WELL_KNOWN_DOMAINS: &str = "EMAIL_GATEKEEPER_WELL_KNOWN_DOMAINS";
pub const ENV_DISPOSABLE_DOMAINS: &str = "EMAIL_GATEKEEPER_DISPOSABLE_DOMAINS";

const DEFAULT_ALLOWED_TLDS: &[&str] = &[
    "com", "org", "net", "in", "co", "edu", "io", "dev", "tech", "gov",
];

const DEFAULT_WELL_KNOWN_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "outlook.com",
    "hotmail.com",
    "icloud.com",
    "protonmail.com",
    "aol.com",
    "live.com",
];

const DEFAULT_DISPOSABLE_DOMAINS: &[&str] = &[
    "mailinator.com",
    "10minutemail.com",
    "guerrillamail.com",
    "tempmail.com",
    "trashmail.com",
];

/// # Validator Configuration
///
/// ## Fields
/// - `db_path`: audit storage location. A `mongodb://` or `mongodb+srv://` URI
///   selects the MongoDB backend, anything else is a JSON-lines file path.
/// - `database_name`: MongoDB database used when `db_path` is a URI
/// - `pool_size`: number of concurrent MX lookups
/// - `suggestion_threshold`: minimum similarity ratio for a typo suggestion
/// - `lookup_timeout_ms`: upper bound on a single MX lookup
/// - `allowed_tlds`, `well_known_domains`, `disposable_domains`: policy tables.
///   The order of `well_known_domains` breaks suggestion ties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub db_path: String,
    pub database_name: String,
    pub pool_size: usize,
    pub suggestion_threshold: f64,
    pub lookup_timeout_ms: u64,
    pub allowed_tlds: Vec<String>,
    pub well_known_domains: Vec<String>,
    pub disposable_domains: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            db_path: "validation_log.jsonl".to_string(),
            database_name: "email_gatekeeper".to_string(),
            pool_size: 4,
            suggestion_threshold: 0.8,
            lookup_timeout_ms: 3000,
            allowed_tlds: to_owned_list(DEFAULT_ALLOWED_TLDS),
            well_known_domains: to_owned_list(DEFAULT_WELL_KNOWN_DOMAINS),
            disposable_domains: to_owned_list(DEFAULT_DISPOSABLE_DOMAINS),
        }
    }
}

impl ValidatorConfig {
    /// Builds a configuration from defaults, `.env` and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_DB_PATH) {
            config.db_path = value;
        }
        if let Some(value) = lookup(ENV_DATABASE_NAME) {
            config.database_name = value;
        }
        if let Some(value) = lookup(ENV_POOL_SIZE) {
            config.pool_size = parse_value(ENV_POOL_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_SUGGESTION_THRESHOLD) {
            config.suggestion_threshold = parse_value(ENV_SUGGESTION_THRESHOLD, &value)?;
        }
        if let Some(value) = lookup(ENV_LOOKUP_TIMEOUT_MS) {
            config.lookup_timeout_ms = parse_value(ENV_LOOKUP_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_ALLOWED_TLDS) {
            config.allowed_tlds = parse_list(&value);
        }
        if let Some(value) = lookup(ENV_WELL_KNOWN_DOMAINS) {
            config.well_known_domains = parse_list(&value);
        }
        if let Some(value) = lookup(ENV_DISPOSABLE_DOMAINS) {
            config.disposable_domains = parse_list(&value);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::EmptyPool);
        }
        if !(0.0..=1.0).contains(&self.suggestion_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.suggestion_threshold));
        }
        if self.lookup_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.allowed_tlds.is_empty() {
            return Err(ConfigError::NoAllowedTlds);
        }
        Ok(())
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn uses_mongodb(&self) -> bool {
        self.db_path.starts_with("mongodb://") || self.db_path.starts_with("mongodb+srv://")
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnv {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}
