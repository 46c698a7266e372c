//! Error types for the heyman query pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Cache store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cache directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Invalid cache entry at {path:?}: {reason}")]
    InvalidEntry { path: PathBuf, reason: String },

    #[error("Failed to serialize cache entry: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors surfaced to callers of the query pipeline
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Provider timed out: {0}")]
    ProviderTimeout(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Cache error: {0}")]
    CacheError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Information not found in the man page")]
    NotFoundInReference,

    #[error("Failed to format output: {0}")]
    OutputFormat(String),

    #[error("Cached response invalid: {0}")]
    CachedResponseInvalid(String),

    #[error("Unable to generate valid command: {0}")]
    RetryFailed(String),

    #[error("Reference documentation unavailable: {0}")]
    ReferenceUnavailable(String),
}

impl ApiError {
    /// True for errors raised by a backend, as opposed to local policy
    /// (cancellation, validation, configuration).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiError::ProviderError(_)
                | ApiError::ProviderRequestFailed(_)
                | ApiError::ProviderAuthFailed(_)
                | ApiError::ProviderRateLimit(_)
                | ApiError::ProviderModelNotFound(_)
                | ApiError::ProviderTimeout(_)
        )
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
