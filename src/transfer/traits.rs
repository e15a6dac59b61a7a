//! Trait definitions for transfer backends

use crate::types::{JobId, MediaKind, MediaMetadata, ProgressEvent};
use async_trait::async_trait;
use std::ops::ControlFlow;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Callback a backend reports progress through
///
/// Returning `ControlFlow::Break(())` means the job was cancelled; the backend
/// must stop the transfer and return [`Error::Cancelled`](crate::Error::Cancelled).
pub type ProgressSink<'a> = dyn FnMut(ProgressEvent) -> ControlFlow<()> + Send + 'a;

/// Everything a backend needs to fetch one source
#[derive(Clone, Debug)]
pub struct TransferRequest {
    /// Artifact id; every file the backend writes must start with it
    pub id: JobId,
    /// Canonical source URL
    pub url: String,
    /// Target container/format
    pub format: String,
    /// Quality label
    pub quality: String,
    /// What kind of media is being fetched
    pub kind: MediaKind,
    /// Directory the artifacts are written to (shared between jobs)
    pub output_dir: PathBuf,
}

impl TransferRequest {
    /// Id rendered as the file-name prefix
    pub fn file_prefix(&self) -> String {
        self.id.to_string()
    }
}

/// What a backend reports after a successful transfer
#[derive(Clone, Debug, Default)]
pub struct TransferOutcome {
    /// Backend-side metadata (id, title, duration) for the fetched item
    pub info: MediaMetadata,
    /// Directory the artifacts were written to
    pub output_dir: PathBuf,
}

/// Capabilities of a transfer backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCapabilities {
    /// Whether the backend merges separate video and audio streams itself
    pub merges_streams: bool,
    /// Whether the backend can extract/convert audio
    pub extracts_audio: bool,
}

/// A way of getting bytes for a source onto disk
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Fetch `request` into `request.output_dir`
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`](crate::Error::Cancelled) when the sink breaks or
    /// `cancel` fires, [`Error::Transfer`](crate::Error::Transfer) for backend
    /// failures.
    async fn fetch(
        &self,
        request: &TransferRequest,
        sink: &mut ProgressSink<'_>,
        cancel: &CancellationToken,
    ) -> crate::Result<TransferOutcome>;

    /// Get the capabilities of this backend
    fn capabilities(&self) -> TransferCapabilities;

    /// Get the name of this backend
    fn name(&self) -> &'static str;
}
