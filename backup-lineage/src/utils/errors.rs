//! Error types for lineage resolution.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LineageError {
    /// An object name that does not decode to a backup record.
    /// Listing code skips these; it never aborts a resolution.
    #[error("Malformed identity: {0}")]
    MalformedIdentity(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Conflicting policy: {0}")]
    ConflictingPolicy(String),

    /// Record timestamps are non-negative Unix seconds.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("Malformed header {key}: {value:?}")]
    MalformedHeader { key: String, value: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LineageError>;
