//! Error types for cryptographic operations

use thiserror::Error;

/// Errors that can occur while decrypting archive tables
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The reader ended before the whole table could be read
    #[error("Table {name} truncated: expected {expected} bytes, got {actual}")]
    TableTruncated {
        /// Table name used as the decryption key
        name: String,
        /// Expected table size in bytes
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
