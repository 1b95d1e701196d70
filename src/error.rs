//! Error types for Backtrack
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by the stage of a media acquisition that produced
//! them (resolution, selection, download, storage) so the application shell
//! can present a terminal failure state and decide whether to re-attempt.
//!
//! ## Categories
//!
//! - **Resolution**: the metadata endpoint was unreachable, answered with a
//!   non-2xx status, or returned a payload that fails schema validation.
//! - **Selection**: no stream variant satisfies the request (missing quality
//!   tier, or content without an audio/video track).
//! - **Download**: a chunk exhausted its retries, or the total size of a
//!   variant could not be determined.
//! - **Store**: the local SQLite cache failed. A store failure is never
//!   reported as a cache miss.

use crate::api::models::{ContentId, MediaKind};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our BacktrackError type
pub type Result<T> = std::result::Result<T, BacktrackError>;

/// Coarse error category, one per acquisition stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Resolution,
    Selection,
    Download,
    Store,
    Other,
}

/// Main error type for Backtrack
///
/// Each variant includes descriptive error messages and relevant context.
#[derive(Error, Debug)]
pub enum BacktrackError {
    // ===== Resolution Errors =====

    /// Content id does not look like an upstream video id
    #[error("Invalid content id: {0}")]
    InvalidContentId(String),

    /// Metadata request failed in transport or returned a non-2xx status
    #[error("Metadata request failed: {message}")]
    MetadataRequestFailed {
        message: String,
        /// HTTP status code if a response was received
        status_code: Option<u16>,
    },

    /// Metadata response did not satisfy the player response schema
    #[error("Invalid metadata: {message}")]
    InvalidMetadata {
        message: String,
        /// Response body snippet for debugging
        response_body: Option<String>,
    },

    // ===== Selection Errors =====

    /// No variant matches the requested kind and quality
    #[error("No {kind} variant found{}", quality.as_deref().map(|q| format!(" for quality '{}'", q)).unwrap_or_default())]
    NoMatchingVariant {
        kind: MediaKind,
        quality: Option<String>,
    },

    // ===== Download Errors =====

    /// Neither the variant nor a probe request yielded a total size
    #[error("Total size of format {format_id} could not be determined")]
    SizeUnknown { format_id: String },

    /// Declared total size is above the configured limit
    #[error("Format {format_id} declares {total} bytes, above the limit of {limit} bytes")]
    SizeLimitExceeded { format_id: String, total: u64, limit: u64 },

    /// A chunk exhausted its retry budget
    #[error("Chunk {index} (bytes {start}-{end}) failed after {attempts} attempts: {reason}")]
    ChunkFailed {
        index: usize,
        start: u64,
        end: u64,
        attempts: u32,
        reason: String,
    },

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Server returned unexpected status code for a range request
    #[error("Server responded with unexpected status code: {status_code}")]
    UnexpectedStatusCode { status_code: u16 },

    /// Range response length differs from the planned range length
    #[error("Download size mismatch: expected {expected} bytes, got {actual} bytes")]
    FileSizeMismatch { expected: u64, actual: u64 },

    /// A single request attempt timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    // ===== Store Errors =====

    /// Generic database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    // ===== General Errors =====

    /// Another acquisition for the same content id is still running
    #[error("Acquisition already in progress for {0}")]
    AcquisitionInProgress(ContentId),

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client construction error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BacktrackError {
    /// Create an InvalidMetadata error without a body snippet
    pub fn invalid_metadata<S: Into<String>>(message: S) -> Self {
        BacktrackError::InvalidMetadata {
            message: message.into(),
            response_body: None,
        }
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        BacktrackError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        BacktrackError::InternalError(message.into())
    }

    /// Which acquisition stage this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            BacktrackError::InvalidContentId(_)
            | BacktrackError::MetadataRequestFailed { .. }
            | BacktrackError::InvalidMetadata { .. } => ErrorCategory::Resolution,

            BacktrackError::NoMatchingVariant { .. } => ErrorCategory::Selection,

            BacktrackError::SizeUnknown { .. }
            | BacktrackError::SizeLimitExceeded { .. }
            | BacktrackError::ChunkFailed { .. }
            | BacktrackError::NetworkError { .. }
            | BacktrackError::UnexpectedStatusCode { .. }
            | BacktrackError::FileSizeMismatch { .. }
            | BacktrackError::Timeout(_) => ErrorCategory::Download,

            BacktrackError::DatabaseError(_)
            | BacktrackError::MigrationFailed(_)
            | BacktrackError::SqlxError(_) => ErrorCategory::Store,

            _ => ErrorCategory::Other,
        }
    }

    /// Check if a single chunk attempt that failed with this error may be retried
    ///
    /// Returns `true` for transport failures, timeouts, unexpected statuses and
    /// short reads. An expired or IP-bound URL typically shows up as a 403,
    /// which is retryable here because the next attempt refreshes the URL.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BacktrackError::NetworkError { is_transient: true, .. }
                | BacktrackError::Timeout(_)
                | BacktrackError::UnexpectedStatusCode { .. }
                | BacktrackError::FileSizeMismatch { .. }
        )
    }

    /// Check if error originates in the local cache store
    pub fn is_store_error(&self) -> bool {
        self.category() == ErrorCategory::Store
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::Resolution => {
                "Could not load video information. Please check the link and try again.".to_string()
            }
            ErrorCategory::Selection => match self {
                BacktrackError::NoMatchingVariant { kind: MediaKind::Audio, .. } => {
                    "This video has no downloadable audio track.".to_string()
                }
                BacktrackError::NoMatchingVariant { quality: Some(q), .. } => {
                    format!("This video is not available in '{}' quality.", q)
                }
                _ => "This video has no downloadable video track.".to_string(),
            },
            ErrorCategory::Download => "Download failed. Please try again.".to_string(),
            ErrorCategory::Store => {
                "Offline storage is unavailable. Please free some space and try again.".to_string()
            }
            ErrorCategory::Other => match self {
                BacktrackError::AcquisitionInProgress(_) => "Download already in progress.".to_string(),
                _ => self.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            BacktrackError::invalid_metadata("missing title").category(),
            ErrorCategory::Resolution
        );
        assert_eq!(
            BacktrackError::NoMatchingVariant { kind: MediaKind::Audio, quality: None }.category(),
            ErrorCategory::Selection
        );
        assert_eq!(
            BacktrackError::SizeUnknown { format_id: "251".to_string() }.category(),
            ErrorCategory::Download
        );
        assert!(BacktrackError::DatabaseError("disk full".to_string()).is_store_error());
    }

    #[test]
    fn test_retryable() {
        assert!(BacktrackError::Timeout(Duration::from_secs(18)).is_retryable());
        assert!(BacktrackError::UnexpectedStatusCode { status_code: 403 }.is_retryable());
        assert!(BacktrackError::network_error("reset", true).is_retryable());
        assert!(!BacktrackError::network_error("bad url", false).is_retryable());
        assert!(!BacktrackError::SizeUnknown { format_id: "1".to_string() }.is_retryable());
        assert!(!BacktrackError::SizeLimitExceeded {
            format_id: "1".to_string(),
            total: u64::MAX,
            limit: 1,
        }
        .is_retryable());
    }

    #[test]
    fn test_no_matching_variant_message() {
        let err = BacktrackError::NoMatchingVariant {
            kind: MediaKind::Video,
            quality: Some("medium".to_string()),
        };
        assert_eq!(err.to_string(), "No video variant found for quality 'medium'");

        let err = BacktrackError::NoMatchingVariant { kind: MediaKind::Audio, quality: None };
        assert_eq!(err.to_string(), "No audio variant found");
    }
}
