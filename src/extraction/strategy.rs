//! Extraction strategy trait

use crate::types::MediaMetadata;
use async_trait::async_trait;

/// One pluggable way of obtaining metadata for a URL
///
/// Strategies are tried in priority order by the
/// [`ExtractionResolver`](super::ExtractionResolver). Returning `Ok(None)`, an
/// empty [`MediaMetadata`], or an error all mean "not found here, try the next
/// one".
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Look up metadata for a canonical URL
    async fn extract(&self, url: &str) -> crate::Result<Option<MediaMetadata>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
