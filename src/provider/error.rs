//! Provider Error Types

use thiserror::Error;

/// Errors returned by data provider fetches
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level HTTP failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Backend responded with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Direct store query failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Provider cannot be reached or is misconfigured
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Blocking query task failed to complete
    #[error("Query task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for ProviderError {
    fn from(e: tokio::task::JoinError) -> Self {
        ProviderError::Join(e.to_string())
    }
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;
