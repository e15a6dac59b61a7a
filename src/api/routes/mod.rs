//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] — Submissions, cancellation, progress snapshots and streams
//! - [`media`] — Metadata lookup
//! - [`files`] — Download-once artifact retrieval
//! - [`system`] — Health, OpenAPI

use crate::types::JobId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

mod files;
mod jobs;
mod media;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use files::*;
pub use jobs::*;
pub use media::*;
pub use system::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Body of POST /info
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct InfoRequest {
    /// URL or share text containing one
    pub url: String,
}

/// Body of POST /downloads
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct DownloadRequest {
    /// URL or share text containing one
    pub url: String,
    /// Output format (default: `download.default_format`)
    #[serde(default)]
    pub format: Option<String>,
    /// Quality label (default: `download.default_quality`)
    #[serde(default)]
    pub quality: Option<String>,
    /// Owner label recorded with the history entry
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Body of POST /downloads/audio
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct AudioDownloadRequest {
    /// URL or share text containing one
    pub url: String,
    /// Audio format (default: mp3)
    #[serde(default)]
    pub format: Option<String>,
    /// Owner label recorded with the history entry
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Body of POST /batches
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct BatchDownloadRequest {
    /// Sources, processed in order
    pub urls: Vec<String>,
    /// Output format (default: `download.default_format`)
    #[serde(default)]
    pub format: Option<String>,
    /// Quality label (default: `download.default_quality`)
    #[serde(default)]
    pub quality: Option<String>,
    /// Owner label recorded with every history entry
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Response of a successful submission
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct JobStarted {
    /// Id to poll, stream or cancel
    pub job_id: JobId,
    /// Always "started"
    pub status: String,
    /// Number of sources (batches only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

/// Response of POST /jobs/{id}/cancel
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct JobCancelled {
    /// Always "cancelled"
    pub status: String,
    /// The job the request was for
    pub job_id: JobId,
}
