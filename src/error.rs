//! Error types for the remediation engine

use thiserror::Error;

/// Result type alias for remediation engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the library
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Cache storage errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Unknown scope: {0}")]
    UnknownScope(String),

    #[error("Invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("Cache backend {0} is not pruneable")]
    NotPruneable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cache I/O error: {0}")]
    Io(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),

    #[error("Could not determine the user cache directory")]
    NoHome,
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Cache DSN cannot contain an empty value")]
    EmptyDsn,

    #[error("Unsupported cache backend: {0}")]
    UnsupportedBackend(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Remote decision feed errors
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Decision feed rejected the credentials")]
    Unauthorized,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid decision feed response: {0}")]
    InvalidResponse(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::InvalidResponse(err.to_string())
    }
}
