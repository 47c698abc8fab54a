//! Error types for the response cache
//!
//! Only configuration and loading paths surface these errors. The per-turn
//! lookup and write paths degrade to a miss or a logged no-op instead.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid cache configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Unknown or unsupported cache tier
    #[error("Invalid cache tier: {0}")]
    InvalidTier(String),

    /// Template set could not be loaded or rendered
    #[error("Template error: {0}")]
    TemplateError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Filesystem error while loading phrase or template files
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
