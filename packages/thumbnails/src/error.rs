use std::time::Duration;

use storage::StorageError;
use thiserror::Error;

/// Errors raised by a [`MetadataStore`](crate::metadata::MetadataStore).
#[derive(Debug, Error)]
pub enum MetadataError {
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metadata backend '{backend}' does not support batch prefetch")]
    BatchUnsupported { backend: &'static str },
}

/// Errors raised while transforming source bytes into thumbnail bytes.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to decode source image: {0}")]
    Decode(String),

    #[error("Failed to encode thumbnail: {0}")]
    Encode(String),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Processing task failed: {0}")]
    Task(String),
}

/// Crate-level error returned by managers, the generator and the fetch coordinator.
#[derive(Debug, Error)]
pub enum ThumbnailError {
    /// A thumbnail attribute needing backend data was accessed, but no source
    /// image is bound and the size has no fallback.
    #[error("Thumbnail '{size}' is unresolvable: no source image")]
    NoSource { size: String },

    #[error("No such size: '{0}'")]
    UnknownSize(String),

    #[error("Metadata backend '{backend}' does not support batch prefetch")]
    BatchUnsupported { backend: &'static str },

    #[error("Thumbnail '{size}' for '{source_id}' not found")]
    NotFound { source_id: String, size: String },

    #[error("Thumbnail generation failed: {0}")]
    Generation(#[from] ProcessError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Metadata error: {0}")]
    Metadata(MetadataError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<MetadataError> for ThumbnailError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::BatchUnsupported { backend } => Self::BatchUnsupported { backend },
            other => Self::Metadata(other),
        }
    }
}

impl From<config::ConfigError> for ThumbnailError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
