use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or checking [`ValidatorConfig`](crate::config::ValidatorConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },

    #[error("pool_size must be at least 1")]
    EmptyPool,

    #[error("suggestion_threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),

    #[error("lookup_timeout_ms must be greater than zero")]
    ZeroTimeout,

    #[error("allowed_tlds must not be empty")]
    NoAllowedTlds,
}

/// # Persistence Failure
///
/// The audit store could not be opened, written or read. Raised per attempt;
/// the orchestrator reports it on its event channel and keeps running.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("audit database error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("corrupt audit record at {location}: {reason}")]
    Corrupt { location: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("malformed export row {row}: {reason}")]
    Malformed { row: usize, reason: String },
}
