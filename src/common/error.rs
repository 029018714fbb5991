//! Error types for the application.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Correlation store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database lock poisoned: {message}")]
    LockPoisoned { message: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
}

/// Outbound send errors, from either platform.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Discord error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Send succeeded but no message id was returned")]
    MissingMessageId,
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for send operations.
pub type SendResult<T> = std::result::Result<T, SendError>;
