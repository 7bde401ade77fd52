//! Error types for cache operations

use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Key already present; callers remove it before inserting again
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Invalid cache configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
