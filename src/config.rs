//! Configuration types for media-fetch

use crate::error::{Error, Result};
use crate::types::{MediaKind, Phase};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Main configuration for [`MediaFetcher`](crate::MediaFetcher)
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig) — artifact directory and request defaults
/// - [`tools`](ToolsConfig) — ffmpeg/ffprobe/yt-dlp locations and timeouts
/// - [`progress`](ProgressConfig) — store TTL, poll interval, extraction cache TTL
/// - [`phases`](PhaseConfig) — percentage bands per media kind
/// - [`persistence`](PersistenceConfig) — history database
/// - [`server`](ServerIntegrationConfig) — REST API
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Artifact directory and request defaults
    #[serde(default)]
    pub download: DownloadConfig,

    /// External tool locations
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Progress tracking intervals and TTLs
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Phase percentage bands
    #[serde(default)]
    pub phases: PhaseConfig,

    /// History database
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Extraction strategy endpoints
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Artifact directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Check the configuration for values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.download.download_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "download directory must not be empty".into(),
                key: Some("download.download_dir".into()),
            });
        }

        if self.download.max_batch_size == 0 {
            return Err(Error::Config {
                message: "max_batch_size must be at least 1".into(),
                key: Some("download.max_batch_size".into()),
            });
        }

        if self.progress.poll_interval.is_zero() {
            return Err(Error::Config {
                message: "poll interval must be greater than zero".into(),
                key: Some("progress.poll_interval_ms".into()),
            });
        }

        for (name, bands) in [
            ("video_audio", &self.phases.video_audio),
            ("audio_only", &self.phases.audio_only),
            ("single_stream", &self.phases.single_stream),
            ("slideshow", &self.phases.slideshow),
        ] {
            bands.validate().map_err(|message| Error::Config {
                message,
                key: Some(format!("phases.{name}")),
            })?;
        }

        Ok(())
    }
}

/// Artifact directory and request defaults
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Directory shared by all jobs for artifacts (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Format used when a request does not name one (default: "mp4")
    #[serde(default = "default_format")]
    pub default_format: String,

    /// Quality used when a request does not name one (default: "720p")
    #[serde(default = "default_quality")]
    pub default_quality: String,

    /// Largest accepted batch (default: 50)
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// History rows kept per user; older rows are trimmed (default: 50)
    #[serde(default = "default_history_keep")]
    pub history_keep: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            default_format: default_format(),
            default_quality: default_quality(),
            max_batch_size: default_max_batch_size(),
            history_keep: default_history_keep(),
        }
    }
}

/// External tool paths (ffmpeg, ffprobe, yt-dlp)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolsConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Path to ffprobe executable (auto-detected if None, or next to ffmpeg)
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Upper bound for a single probe call (default: 15 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,

    /// Upper bound for a merge or re-encode (default: 600 seconds)
    #[serde(default = "default_merge_timeout", with = "duration_serde")]
    pub merge_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            ytdlp_path: None,
            search_path: true,
            probe_timeout: default_probe_timeout(),
            merge_timeout: default_merge_timeout(),
        }
    }
}

/// Progress store and observer timing
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressConfig {
    /// Entries older than this (from creation) are evicted on read (default: 3600 seconds)
    #[serde(default = "default_store_ttl", with = "duration_serde")]
    pub store_ttl: Duration,

    /// Interval between progress polls by SSE observers (default: 500 ms)
    #[serde(
        rename = "poll_interval_ms",
        default = "default_poll_interval",
        with = "millis_serde"
    )]
    pub poll_interval: Duration,

    /// Lifetime of cached extraction results (default: 600 seconds)
    #[serde(default = "default_extraction_cache_ttl", with = "duration_serde")]
    pub extraction_cache_ttl: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            store_ttl: default_store_ttl(),
            poll_interval: default_poll_interval(),
            extraction_cache_ttl: default_extraction_cache_ttl(),
        }
    }
}

/// A percentage range a phase is scaled into
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Band {
    /// Progress at 0% of the phase
    pub start: f64,
    /// Progress at 100% of the phase
    pub end: f64,
}

impl Band {
    /// Create a band
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Map a 0-100 fraction of the phase into the band
    pub fn scale(&self, percent: f64) -> f64 {
        let percent = percent.clamp(0.0, 100.0);
        self.start + (self.end - self.start) * percent / 100.0
    }
}

/// Percentage bands for one media kind
///
/// The last phase before finalize always leaves headroom below 100 for the
/// merge/convert/zip step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PhaseBands {
    /// First stream, or the sequential items of a slideshow
    pub primary: Band,
    /// Second stream (None when the kind has a single transfer phase)
    #[serde(default)]
    pub secondary: Option<Band>,
    /// Checkpoint held while finalizing
    pub finalize_at: f64,
    /// Phase reported while finalizing
    pub finalize_phase: Phase,
}

impl PhaseBands {
    fn validate(&self) -> std::result::Result<(), String> {
        let check = |band: &Band, label: &str| {
            if !(0.0..=100.0).contains(&band.start) || band.start > band.end {
                return Err(format!(
                    "{label} band {}..{} is inverted or out of range",
                    band.start, band.end
                ));
            }
            if band.end > self.finalize_at {
                return Err(format!(
                    "{label} band ends at {} which is past the finalize checkpoint {}",
                    band.end, self.finalize_at
                ));
            }
            Ok(())
        };

        check(&self.primary, "primary")?;
        if let Some(secondary) = &self.secondary {
            check(secondary, "secondary")?;
            if secondary.start < self.primary.end {
                return Err("secondary band overlaps primary band".into());
            }
        }
        if self.finalize_at >= 100.0 {
            return Err("finalize checkpoint must stay below 100".into());
        }
        Ok(())
    }
}

/// Phase bands for each media kind
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PhaseConfig {
    /// Video then audio stream, merged (default: 0-50 / 50-90 / merging at 90)
    #[serde(default = "default_video_audio_bands")]
    pub video_audio: PhaseBands,

    /// Audio stream then conversion (default: 0-90 / converting at 90)
    #[serde(default = "default_audio_only_bands")]
    pub audio_only: PhaseBands,

    /// Single muxed stream (default: 0-95 / finalizing at 95)
    #[serde(default = "default_single_stream_bands")]
    pub single_stream: PhaseBands,

    /// Sequential images then zip (default: 0-90 / zipping at 90)
    #[serde(default = "default_slideshow_bands")]
    pub slideshow: PhaseBands,
}

impl PhaseConfig {
    /// Bands for a media kind
    pub fn for_kind(&self, kind: MediaKind) -> &PhaseBands {
        match kind {
            MediaKind::VideoAudio => &self.video_audio,
            MediaKind::AudioOnly => &self.audio_only,
            MediaKind::SingleStream => &self.single_stream,
            MediaKind::Slideshow => &self.slideshow,
        }
    }
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            video_audio: default_video_audio_bands(),
            audio_only: default_audio_only_bands(),
            single_stream: default_single_stream_bands(),
            slideshow: default_slideshow_bands(),
        }
    }
}

/// Persistence configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Database path (default: "./media-fetch.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Extraction strategy settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ExtractionConfig {
    /// oEmbed endpoint queried with `?url=...&format=json` (None disables the strategy)
    #[serde(default)]
    pub oembed_endpoint: Option<String>,

    /// Fetch the page and search embedded JSON blobs (default: false)
    #[serde(default)]
    pub embedded_json: bool,
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_format() -> String {
    "mp4".into()
}

fn default_quality() -> String {
    "720p".into()
}

fn default_max_batch_size() -> usize {
    50
}

fn default_history_keep() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_merge_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_store_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_extraction_cache_ttl() -> Duration {
    Duration::from_secs(600)
}

fn default_video_audio_bands() -> PhaseBands {
    PhaseBands {
        primary: Band::new(0.0, 50.0),
        secondary: Some(Band::new(50.0, 90.0)),
        finalize_at: 90.0,
        finalize_phase: Phase::Merging,
    }
}

fn default_audio_only_bands() -> PhaseBands {
    PhaseBands {
        primary: Band::new(0.0, 90.0),
        secondary: None,
        finalize_at: 90.0,
        finalize_phase: Phase::Converting,
    }
}

fn default_single_stream_bands() -> PhaseBands {
    PhaseBands {
        primary: Band::new(0.0, 95.0),
        secondary: None,
        finalize_at: 95.0,
        finalize_phase: Phase::Finalizing,
    }
}

fn default_slideshow_bands() -> PhaseBands {
    PhaseBands {
        primary: Band::new(0.0, 90.0),
        secondary: None,
        finalize_at: 90.0,
        finalize_phase: Phase::Zipping,
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("media-fetch.db")
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper (as seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (as milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_preserve_documented_constants() {
        let config = Config::default();

        assert_eq!(config.progress.store_ttl, Duration::from_secs(3600));
        assert_eq!(config.progress.poll_interval, Duration::from_millis(500));
        assert_eq!(config.progress.extraction_cache_ttl, Duration::from_secs(600));
        assert_eq!(config.phases.video_audio.primary, Band::new(0.0, 50.0));
        assert_eq!(config.phases.video_audio.secondary, Some(Band::new(50.0, 90.0)));
        assert_eq!(config.phases.video_audio.finalize_at, 90.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");

        assert_eq!(config.download.default_format, "mp4");
        assert_eq!(config.download.default_quality, "720p");
        assert_eq!(config.phases.slideshow.finalize_phase, Phase::Zipping);
        assert_eq!(config.server.api.bind_address.port(), 6790);
    }

    #[test]
    fn poll_interval_is_serialized_in_milliseconds() {
        let json = serde_json::to_value(ProgressConfig::default()).unwrap();

        assert_eq!(json["poll_interval_ms"], 500);
        assert_eq!(json["store_ttl"], 3600);
    }

    #[test]
    fn band_scaling_clamps_input() {
        let band = Band::new(50.0, 90.0);

        assert_eq!(band.scale(0.0), 50.0);
        assert_eq!(band.scale(50.0), 70.0);
        assert_eq!(band.scale(150.0), 90.0);
        assert_eq!(band.scale(-3.0), 50.0);
    }

    #[test]
    fn validate_rejects_band_past_finalize_checkpoint() {
        let mut config = Config::default();
        config.phases.audio_only.primary = Band::new(0.0, 97.0);

        let err = config.validate().unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("phases.audio_only")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_overlapping_secondary_band() {
        let mut config = Config::default();
        config.phases.video_audio.secondary = Some(Band::new(40.0, 90.0));

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_finalize_at_one_hundred() {
        let mut config = Config::default();
        config.phases.single_stream.primary = Band::new(0.0, 100.0);
        config.phases.single_stream.finalize_at = 100.0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_download_dir() {
        let mut config = Config::default();
        config.download.download_dir = PathBuf::new();

        assert!(config.validate().is_err());
    }
}
