//! Application state for the API server

use crate::{Config, MediaFetcher};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The fetcher jobs are submitted to
    pub fetcher: Arc<MediaFetcher>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(fetcher: Arc<MediaFetcher>, config: Arc<Config>) -> Self {
        Self { fetcher, config }
    }
}
