//! Error types for media-fetch
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Extraction, Transfer, StreamIntegrity, etc.)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for media-fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message written to the progress store when a job is cancelled
pub const CANCELLED_MESSAGE: &str = "Download cancelled by user";

/// Main error type for media-fetch
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
        /// The configuration key that caused the error (e.g., "download.download_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Every metadata extraction strategy came back empty
    #[error("could not extract media information from {url} ({attempted} strategies tried)")]
    Extraction {
        /// The canonical URL that was resolved
        url: String,
        /// Number of strategies that were attempted
        attempted: usize,
    },

    /// Network or backend failure while fetching media
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// The job was cancelled through the progress store
    #[error("Download cancelled by user")]
    Cancelled,

    /// A required component stream is missing and could not be restored
    #[error("stream integrity failure: {0}")]
    StreamIntegrity(#[from] StreamIntegrityError),

    /// Codec/container repair failed; the original artifact is kept
    #[error("repair skipped for {path}: {reason}")]
    RepairSkipped {
        /// The artifact that was left untouched
        path: PathBuf,
        /// Why the repair did not complete
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Job, record or file not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Request rejected before any work was started
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// External tool execution failed (ffmpeg, ffprobe, yt-dlp)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is the cooperative-cancellation class
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Failures raised while the transfer backend is fetching media
#[derive(Debug, Error)]
pub enum TransferError {
    /// The backend process or request reported a failure
    #[error("{backend} failed: {reason}")]
    BackendFailed {
        /// Name of the backend (e.g., "yt-dlp")
        backend: String,
        /// Backend-provided reason, usually the last stderr line
        reason: String,
    },

    /// The backend finished but no output artifact was found
    #[error("download completed but output file not found in {dir}")]
    OutputMissing {
        /// Directory that was searched
        dir: PathBuf,
    },

    /// A multi-item transfer produced no usable items
    #[error("no items could be fetched: {reason}")]
    NoItems {
        /// Why nothing was fetched
        reason: String,
    },
}

/// A required stream was missing and the fallback merge did not help
#[derive(Debug, Error)]
pub enum StreamIntegrityError {
    /// The artifact lacks one of the required component streams
    #[error("{path} is missing streams (video={has_video}, audio={has_audio})")]
    MissingStreams {
        /// Artifact that was probed
        path: PathBuf,
        /// Whether a video stream was found
        has_video: bool,
        /// Whether an audio stream was found
        has_audio: bool,
    },

    /// Could not find both intermediate streams to merge
    #[error("fallback merge could not locate {missing} stream for {job_id}")]
    IntermediatesMissing {
        /// Job id whose intermediates were searched
        job_id: String,
        /// Which component was missing ("video" or "audio")
        missing: String,
    },

    /// The media tool produced no output
    #[error("fallback merge produced an empty file at {path}")]
    EmptyOutput {
        /// Expected merge output
        path: PathBuf,
    },
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "extraction_failed",
///     "message": "could not extract media information from https://... (3 strategies tried)",
///     "details": {
///       "attempted": 3
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Error::Config { .. } => 400,
            Error::InvalidInput(_) => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 409 Conflict - job was stopped by its owner
            Error::Cancelled => 409,

            // 422 Unprocessable Entity - the source could not be handled
            Error::Extraction { .. } => 422,
            Error::StreamIntegrity(_) => 422,
            Error::RepairSkipped { .. } => 422,
            Error::Transfer(TransferError::NoItems { .. }) => 422,

            // 500 Internal Server Error
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - upstream failures
            Error::Transfer(_) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
            Error::ExternalTool(_) => 503,

            // 501 Not Implemented
            Error::NotSupported(_) => 501,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Extraction { .. } => "extraction_failed",
            Error::Transfer(e) => match e {
                TransferError::BackendFailed { .. } => "transfer_failed",
                TransferError::OutputMissing { .. } => "output_missing",
                TransferError::NoItems { .. } => "no_items",
            },
            Error::Cancelled => "cancelled",
            Error::StreamIntegrity(_) => "stream_integrity_failed",
            Error::RepairSkipped { .. } => "repair_skipped",
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::InvalidInput(_) => "validation_error",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Extraction { url, attempted } => Some(serde_json::json!({
                "url": url,
                "attempted": attempted,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::StreamIntegrity(StreamIntegrityError::MissingStreams {
                has_video,
                has_audio,
                ..
            }) => Some(serde_json::json!({
                "has_video": has_video,
                "has_audio": has_audio,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
