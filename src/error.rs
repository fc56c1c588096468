//! Error types for the mailroom resolution pipeline
//!
//! Structured errors via thiserror, with a shared `Result` alias. Optional
//! backends (assist, embeddings) never surface their failures through this
//! type to pipeline callers; those are logged and degraded at the call site.

use thiserror::Error;

/// Main error type for mailroom operations
#[derive(Error, Debug)]
pub enum MailroomError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Caller-supplied data was rejected before any state was committed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File type the text source cannot handle
    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    /// Review item transition attempted from a terminal state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Record lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Language-model assist call failed
    #[error("Assist error: {0}")]
    Assist(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Invalid entity/review ID format
    #[error("Invalid ID: {0}")]
    InvalidId(#[from] uuid::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for mailroom operations
pub type Result<T> = std::result::Result<T, MailroomError>;

impl From<anyhow::Error> for MailroomError {
    fn from(err: anyhow::Error) -> Self {
        MailroomError::Other(err.to_string())
    }
}
