//! Error types for audit capture.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by an [`AuditSink`](crate::AuditSink).
///
/// The pipeline never propagates these to the request; they are logged and
/// dropped by the delivery loop.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Underlying I/O failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The event could not be serialized.
    #[error("failed to serialize audit event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store is not reachable.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The backing store refused the event.
    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Audit configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read config: {source}")]
    Read {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    Parse { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },
}
