//! API Error Types
//!
//! Errors raised while starting or serving the HTTP layer.

use thiserror::Error;

/// Startup and serve errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// Configuration could not be loaded or is invalid
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Data provider could not be built
    #[error("Provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Binding or serving the listener failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
