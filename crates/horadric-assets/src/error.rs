//! Asset resolution errors

use std::path::PathBuf;

use horadric_cache::CacheError;
use horadric_mpq::{ErrorKind, MpqError};
use thiserror::Error;

/// Errors returned by the asset resolver
#[derive(Debug, Error)]
pub enum AssetError {
    /// No archive in the load order contains the path
    #[error("asset not found in any archive: {0}")]
    NotFound(String),

    /// An archive in the load order could not be opened
    #[error("failed to open archive {}: {source}", .path.display())]
    ArchiveOpen {
        /// Path of the archive
        path: PathBuf,
        /// Underlying error
        #[source]
        source: MpqError,
    },

    /// Reading from an owning archive failed
    #[error("archive error: {0}")]
    Archive(#[from] MpqError),

    /// Cache construction or insertion failed
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Invalid resolver configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AssetError {
    /// Storage error category, for errors that come from archive access
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::NotFound(_) => Some(ErrorKind::NotFound),
            Self::ArchiveOpen { source, .. } | Self::Archive(source) => Some(source.kind()),
            Self::Io(_) => Some(ErrorKind::Io),
            Self::Cache(_) | Self::Config(_) | Self::Json(_) => None,
        }
    }

    /// Whether the asset is absent, including delete markers
    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_passes_through_archive_errors() {
        let err = AssetError::from(MpqError::UnsupportedCompression(0x10));
        assert_eq!(err.kind(), Some(ErrorKind::UnsupportedCompression));

        let err = AssetError::from(MpqError::NotFound("x".to_string()));
        assert!(err.is_not_found());

        assert_eq!(AssetError::Config("x".to_string()).kind(), None);
    }

    #[test]
    fn test_archive_open_names_path() {
        let err = AssetError::ArchiveOpen {
            path: PathBuf::from("/games/d2/d2data.mpq"),
            source: MpqError::InvalidFormat("bad archive signature".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "failed to open archive /games/d2/d2data.mpq: invalid MPQ format: bad archive signature"
        );
        assert_eq!(err.kind(), Some(ErrorKind::InvalidFormat));
    }
}
