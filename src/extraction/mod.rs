//! Metadata extraction
//!
//! The [`ExtractionResolver`] normalizes a raw reference to a canonical URL,
//! tries each [`ExtractionStrategy`] in priority order and caches the first
//! non-empty result for a fixed TTL. Strategy errors are logged and treated as
//! "absent"; only exhausting every strategy is an error.

mod http;
pub mod json_search;
mod normalize;
mod strategy;
mod ytdlp;

pub use http::{EmbeddedJsonStrategy, OEmbedStrategy};
pub use normalize::normalize_url;
pub use strategy::ExtractionStrategy;
pub use ytdlp::YtDlpStrategy;

pub(crate) use ytdlp::metadata_from_info;

use crate::error::{Error, Result};
use crate::types::MediaMetadata;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default lifetime of a cached extraction result
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

struct CacheEntry {
    metadata: MediaMetadata,
    fetched_at: Instant,
}

/// Ordered strategy chain with a TTL cache keyed by canonical URL
pub struct ExtractionResolver {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ExtractionResolver {
    /// Create a resolver that tries `strategies` in the given order
    pub fn new(strategies: Vec<Arc<dyn ExtractionStrategy>>, ttl: Duration) -> Self {
        Self {
            strategies,
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Names of the configured strategies, in priority order
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolve metadata for a URL or a piece of share text containing one
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] when no strategy produced a non-empty
    /// result. Individual strategy failures are never returned.
    pub async fn resolve(&self, raw: &str) -> Result<MediaMetadata> {
        let url = normalize_url(raw);

        if let Some(cached) = self.cached(&url) {
            tracing::debug!(url = %url, "extraction cache hit");
            return Ok(cached);
        }

        for strategy in &self.strategies {
            match strategy.extract(&url).await {
                Ok(Some(metadata)) if !metadata.is_empty() => {
                    tracing::info!(url = %url, strategy = strategy.name(), "metadata extracted");
                    self.lock().insert(
                        url,
                        CacheEntry {
                            metadata: metadata.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                    return Ok(metadata);
                }
                Ok(_) => {
                    tracing::debug!(url = %url, strategy = strategy.name(), "strategy returned nothing");
                }
                Err(e) => {
                    tracing::warn!(url = %url, strategy = strategy.name(), error = %e, "strategy failed");
                }
            }
        }

        Err(Error::Extraction {
            url,
            attempted: self.strategies.len(),
        })
    }

    /// Drop every cached entry
    pub fn clear_cache(&self) {
        self.lock().clear();
    }

    fn cached(&self, url: &str) -> Option<MediaMetadata> {
        let mut cache = self.lock();
        match cache.get(url) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.metadata.clone()),
            Some(_) => {
                cache.remove(url);
                None
            }
            None => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.cache.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl std::fmt::Debug for ExtractionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionResolver")
            .field("strategies", &self.strategy_names())
            .field("ttl", &self.ttl)
            .finish()
    }
}
