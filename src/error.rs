//! Error types for the catalog scan engine

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = ScanError> = std::result::Result<T, E>;

/// Error kinds that can occur during a scan session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// The catalog store is unavailable or rejected an operation.
    /// Fatal at session granularity.
    StoreUnavailable,
    /// Metadata extraction failed for a single file (per-file, recoverable)
    ExtractionFailed,
    /// File or directory not found
    NotFound,
    /// Permission denied when accessing a file or directory
    PermissionDenied,
    /// I/O error during file operations
    IoError,
    /// Invalid path encoding or a path the engine cannot track
    InvalidPath,
    /// Unrecoverable configuration error. Fatal.
    Config,
}

/// Represents an error that occurred during scanning
#[derive(Debug, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct ScanError {
    /// The kind of error
    pub kind: ScanErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

impl ScanError {
    /// Create a new scan error
    pub fn new(kind: ScanErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// Only store unavailability and configuration errors terminate a
    /// session; everything else is per-item and recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ScanErrorKind::StoreUnavailable | ScanErrorKind::Config
        )
    }

    /// Create a store error (fatal)
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::StoreUnavailable, None, message)
    }

    /// Create a per-file extraction error
    pub fn extraction(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::ExtractionFailed, Some(path), message)
    }

    /// Create a not found error
    pub fn not_found(path: PathBuf) -> Self {
        Self::new(
            ScanErrorKind::NotFound,
            Some(path.clone()),
            format!("Not found: {:?}", path),
        )
    }

    /// Create an I/O error
    pub fn io_error(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::IoError, path, message)
    }

    /// Create a configuration error (fatal)
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::Config, None, message)
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => ScanErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => ScanErrorKind::NotFound,
            _ => ScanErrorKind::IoError,
        };
        Self::new(kind, None, err.to_string())
    }
}

impl From<rusqlite::Error> for ScanError {
    fn from(err: rusqlite::Error) -> Self {
        Self::store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(ScanError::store("gone").is_fatal());
        assert!(ScanError::config("bad volume").is_fatal());
        assert!(!ScanError::extraction(PathBuf::from("/a.mp3"), "truncated").is_fatal());
        assert!(!ScanError::not_found(PathBuf::from("/a.mp3")).is_fatal());
    }

    #[test]
    fn test_io_error_kind_mapping() {
        let err: ScanError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.kind, ScanErrorKind::PermissionDenied);
        let err: ScanError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind, ScanErrorKind::NotFound);
    }
}
