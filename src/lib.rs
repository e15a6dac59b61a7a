//! # media-fetch
//!
//! Job orchestration and progress engine for fetching media from third-party
//! platforms.
//!
//! ## Design Philosophy
//!
//! media-fetch is designed to be:
//! - **Supervised** - Every submitted job reaches `done` or `error`, even if its task panics
//! - **Cooperative** - Cancellation is a flag checked on every progress callback
//! - **Tidy** - Partial artifacts are removed on every failure path
//! - **Library-first** - The REST API is optional; everything is reachable from [`MediaFetcher`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_fetch::{Config, FetchRequest, MediaFetcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = MediaFetcher::new(Config::default()).await?;
//!
//!     let id = fetcher.submit(FetchRequest::video(
//!         "https://video.example.com/watch/abc",
//!         "mp4",
//!         "720p",
//!     ))?;
//!
//!     // Poll the snapshot (or stream it over SSE via the API)
//!     if let Some(state) = fetcher.progress(id) {
//!         println!("{} {:.0}%", state.status.as_str(), state.progress);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Sequential multi-source jobs
pub(crate) mod batch;
/// Artifact cleanup and orphan scans
pub mod cleanup;
/// Configuration types
pub mod config;
/// History persistence layer
pub mod db;
/// Error types
pub mod error;
/// Metadata extraction strategies
pub mod extraction;
/// Job submission and supervision
pub mod fetcher;
/// Media probing and muxing tools
pub mod media_tool;
/// Single-job fetch pipeline
pub mod pipeline;
/// In-memory job progress store
pub mod progress_store;
/// Transfer backends
pub mod transfer;
/// Core types
pub mod types;
/// Filesystem and naming helpers
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{ApiError, Error, Result, ToHttpStatus};
pub use fetcher::MediaFetcher;
pub use progress_store::{BatchState, JobState, ProgressStore};
pub use types::{
    BatchRequest, FetchRequest, FetchResult, HistoryRecord, JobId, JobKind, JobStatus,
    MediaKind, MediaMetadata, Phase,
};

/// Wait for SIGTERM or SIGINT, then shut the fetcher down gracefully
///
/// Running jobs are cancelled and given a bounded time to write their
/// terminal state and clean up.
///
/// # Example
///
/// ```no_run
/// use media_fetch::{Config, MediaFetcher, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let fetcher = MediaFetcher::new(Config::default()).await?;
///     let _api = fetcher.spawn_api_server();
///
///     run_with_shutdown(fetcher).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(fetcher: MediaFetcher) -> Result<()> {
    wait_for_signal().await;
    fetcher.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
