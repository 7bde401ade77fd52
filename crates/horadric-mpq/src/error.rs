//! MPQ error types

use thiserror::Error;

/// Coarse error category
///
/// Callers that only care about how to react (skip an asset, abort startup,
/// retry I/O) match on this instead of the detailed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad magic, malformed header or corrupt structure
    InvalidFormat,
    /// A decrypted table or sector-offset table failed its sanity check
    DecryptionFailed,
    /// Path not present
    NotFound,
    /// Codec or feature not implemented
    UnsupportedCompression,
    /// Underlying read or seek failure
    Io,
}

/// MPQ-specific error type
#[derive(Debug, Error)]
pub enum MpqError {
    /// Invalid archive structure
    #[error("invalid MPQ format: {0}")]
    InvalidFormat(String),

    /// Decryption produced values that fail the format's sanity checks
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// File not present in the archive
    #[error("file not found: {0}")]
    NotFound(String),

    /// Compression method tag with no decoder
    #[error("unsupported compression method: 0x{0:02X}")]
    UnsupportedCompression(u8),

    /// A supported codec rejected its input
    #[error("decompression failed (method 0x{method:02X}): {reason}")]
    Decompression {
        /// Method tag of the failing codec
        method: u8,
        /// Codec-specific description
        reason: String,
    },

    /// A sector decoded to the wrong length
    #[error("sector {sector} decoded to {actual} bytes, expected {expected}")]
    SectorSizeMismatch {
        /// Sector index within the file
        sector: u32,
        /// Length implied by the block table
        expected: usize,
        /// Length produced by the codec
        actual: usize,
    },

    /// Format feature this reader does not implement
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MpqError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat(_)
            | Self::Decompression { .. }
            | Self::SectorSizeMismatch { .. } => ErrorKind::InvalidFormat,
            Self::DecryptionFailed(_) => ErrorKind::DecryptionFailed,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::UnsupportedCompression(_) | Self::UnsupportedFeature(_) => {
                ErrorKind::UnsupportedCompression
            }
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether this error means the path is absent
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<binrw::Error> for MpqError {
    fn from(err: binrw::Error) -> Self {
        match err {
            binrw::Error::BadMagic { found, .. } => {
                Self::InvalidFormat(format!("bad archive signature {found:?}"))
            }
            binrw::Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Self::InvalidFormat("archive header truncated".to_string())
            }
            binrw::Error::Io(e) => Self::Io(e),
            binrw::Error::Backtrace(backtrace) => Self::from(*backtrace.error),
            other => Self::InvalidFormat(other.to_string()),
        }
    }
}

impl From<horadric_crypto::CryptoError> for MpqError {
    fn from(err: horadric_crypto::CryptoError) -> Self {
        match err {
            horadric_crypto::CryptoError::Io(e) => Self::Io(e),
            truncated @ horadric_crypto::CryptoError::TableTruncated { .. } => {
                Self::DecryptionFailed(truncated.to_string())
            }
        }
    }
}

impl From<MpqError> for std::io::Error {
    fn from(err: MpqError) -> Self {
        let kind = match &err {
            MpqError::Io(e) => e.kind(),
            MpqError::NotFound(_) => std::io::ErrorKind::NotFound,
            MpqError::UnsupportedCompression(_) | MpqError::UnsupportedFeature(_) => {
                std::io::ErrorKind::Unsupported
            }
            _ => std::io::ErrorKind::InvalidData,
        };

        match err {
            MpqError::Io(e) => e,
            other => Self::new(kind, other),
        }
    }
}

/// Result type for MPQ operations
pub type MpqResult<T> = Result<T, MpqError>;
