//! Error types for bundle-dl
//!
//! This module provides the error handling for the library:
//! - A single [`Error`] enum carrying the context needed to diagnose a failure
//!   (file name, archive path, byte counts)
//! - An [`ErrorKind`] taxonomy that callers match on to decide whether a
//!   failed task is worth retrying
//! - Retry classification through [`Error::is_retryable`]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bundle-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bundle-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "chunk_size")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error (connect or transfer failure)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with a non-success status code
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// URL that was requested
        url: String,
    },

    /// Request or transfer timed out
    #[error("timed out: {0}")]
    Timeout(String),

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// Archive format is not supported or the archive is corrupt
    #[error("unsupported or corrupt archive {archive}: {reason}")]
    UnsupportedFormat {
        /// The archive that could not be read
        archive: PathBuf,
        /// The reason the archive was rejected
        reason: String,
    },

    /// Writing an extracted entry to disk failed
    #[error("failed to write {path}: {reason}")]
    EntryWrite {
        /// Destination path of the entry
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// Downloaded file does not match its expected checksum
    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// The file that failed validation
        file: String,
        /// Expected checksum (hex)
        expected: String,
        /// Computed checksum (hex)
        actual: String,
    },

    /// Operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Task not found
    #[error("task not found: {0}")]
    NotFound(String),

    /// Malformed JSON configuration
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`]
///
/// Every error maps onto exactly one kind. Events and task snapshots carry the
/// kind so consumers can react without matching on the full error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection or transfer failure
    Network,
    /// Request deadline exceeded
    Timeout,
    /// Pre-flight free space check failed
    DiskSpace,
    /// Archive extension unsupported or archive unreadable
    UnsupportedFormat,
    /// Filesystem write failure while extracting
    EntryWrite,
    /// Checksum mismatch after download
    Integrity,
    /// Cancelled by the caller
    Cancelled,
    /// Anything else
    Other,
}

impl Error {
    /// Map this error onto the [`ErrorKind`] taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(e) if e.is_timeout() => ErrorKind::Timeout,
            Error::Network(_) | Error::HttpStatus { .. } => ErrorKind::Network,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::InsufficientSpace { .. } | Error::DiskSpaceCheckFailed(_) => {
                ErrorKind::DiskSpace
            }
            Error::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Error::EntryWrite { .. } => ErrorKind::EntryWrite,
            Error::IntegrityMismatch { .. } => ErrorKind::Integrity,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            Error::Config { .. }
            | Error::Io(_)
            | Error::NotFound(_)
            | Error::Serialization(_)
            | Error::Other(_) => ErrorKind::Other,
        }
    }

    /// Returns true if the failure is transient and retrying the task may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            // Network errors are generally retryable
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            Error::Timeout(_) => true,
            // Server-side trouble and rate limiting are transient, client errors are not
            Error::HttpStatus { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            // I/O errors can be retryable in some cases
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            // A corrupted transfer usually downloads cleanly the second time
            Error::IntegrityMismatch { .. } => true,
            // Disk space errors need user action to free space
            Error::InsufficientSpace { .. } | Error::DiskSpaceCheckFailed(_) => false,
            Error::UnsupportedFormat { .. } => false,
            Error::EntryWrite { .. } => false,
            // Retry is how a cancelled task is resumed, but it is not a transient failure
            Error::Cancelled => false,
            Error::Config { .. } => false,
            Error::NotFound(_) => false,
            Error::Serialization(_) => false,
            Error::Other(_) => false,
        }
    }

    /// True if this error represents a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub(crate) fn config(message: impl Into<String>, key: &str) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
