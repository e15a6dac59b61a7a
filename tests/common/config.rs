//! Test configuration helpers for loading .env settings and creating live fetchers

use tempfile::TempDir;
use media_fetch::{Config, MediaFetcher};

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Sources used by the live tests
///
/// Required environment variables:
/// - `MEDIA_FETCH_VIDEO_URL` - A short public video
///
/// Optional environment variables:
/// - `MEDIA_FETCH_BATCH_URLS` - Comma-separated list of short videos
pub struct LiveSources {
    /// Single video source
    pub video_url: String,
    /// Batch sources (falls back to the video URL twice)
    pub batch_urls: Vec<String>,
}

/// Load live sources from environment variables (after reading `.env`)
pub fn load_live_sources() -> Result<LiveSources, ConfigError> {
    dotenvy::dotenv().ok();

    let video_url = std::env::var("MEDIA_FETCH_VIDEO_URL")
        .map_err(|_| ConfigError("MEDIA_FETCH_VIDEO_URL not set in environment".to_string()))?;

    let batch_urls = std::env::var("MEDIA_FETCH_BATCH_URLS")
        .ok()
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|urls| !urls.is_empty())
        .unwrap_or_else(|| vec![video_url.clone(), video_url.clone()]);

    Ok(LiveSources {
        video_url,
        batch_urls,
    })
}

/// Whether live sources are configured and yt-dlp can be found
pub fn has_live_sources() -> bool {
    load_live_sources().is_ok() && which::which("yt-dlp").is_ok()
}

/// Create a MediaFetcher writing into a fresh temp directory
///
/// Returns the fetcher and temp directory (keep temp_dir alive for test duration)
pub async fn create_live_fetcher() -> Result<(MediaFetcher, TempDir), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;

    let mut config = Config::default();
    config.download.download_dir = temp_dir.path().join("downloads");
    config.persistence.database_path = temp_dir.path().join("history.db");

    let fetcher = MediaFetcher::new(config).await?;
    Ok((fetcher, temp_dir))
}
