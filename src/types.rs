//! Core types for media-fetch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for a job and for every artifact it writes
///
/// Artifacts are named `{id}.{ext}` (or `{id}.f{N}.{ext}` for intermediates) so the
/// id doubles as the file-prefix used by cleanup and orphan scans.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
#[schema(value_type = String, example = "0b8e2c1a-4f7d-4a0e-9b5c-2d6f1e3a7c90")]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a fresh random (v4) id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// Stored as hyphenated lowercase text so file prefixes and history keys match
impl sqlx::Type<sqlx::Sqlite> for JobId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.to_string(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let text = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(Uuid::parse_str(&text)?))
    }
}

/// Whether a job fetches one source or a list of sources
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// One source, one artifact
    #[default]
    Single,
    /// Ordered list of sources processed sequentially
    Batch,
}

/// Job status as seen by progress observers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Submitted, no progress written yet
    #[default]
    Waiting,
    /// Work in progress (any non-terminal phase)
    Downloading,
    /// Finished successfully
    Done,
    /// Failed or cancelled
    Error,
}

impl JobStatus {
    /// `Done` and `Error` are terminal: the store refuses further writes
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Downloading => "downloading",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

/// Named sub-stage of a job's state machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Job accepted, nothing transferred yet
    #[default]
    Starting,
    /// First stream (video, or the only stream)
    DownloadingPrimary,
    /// Second stream (audio)
    DownloadingSecondary,
    /// Sequential image items of a slideshow
    DownloadingImages,
    /// Combining component streams
    Merging,
    /// Audio extraction / format conversion
    Converting,
    /// Packaging slideshow images
    Zipping,
    /// Renaming and final checks
    Finalizing,
    /// Terminal success
    Done,
    /// Terminal failure
    Error,
}

impl Phase {
    /// Wire name used in progress events
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Starting => "starting",
            Phase::DownloadingPrimary => "downloading_primary",
            Phase::DownloadingSecondary => "downloading_secondary",
            Phase::DownloadingImages => "downloading_images",
            Phase::Merging => "merging",
            Phase::Converting => "converting",
            Phase::Zipping => "zipping",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
            Phase::Error => "error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The shape of media a job produces; selects the phase bands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Separate video and audio streams merged into one container
    #[default]
    VideoAudio,
    /// Audio extracted and converted
    AudioOnly,
    /// A single muxed stream, no merge step
    SingleStream,
    /// Multiple images packaged into a zip
    Slideshow,
}

/// Progress reported by a transfer backend
///
/// Backends hand these to the pipeline's sink; the sink answers with
/// `ControlFlow::Break(())` once the job has been cancelled.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Bytes are flowing for one stream
    Downloading {
        /// Total size if the backend knows it (exact or estimated)
        bytes_total: Option<u64>,
        /// Bytes received so far
        bytes_done: u64,
        /// Bytes per second
        speed: Option<f64>,
        /// Seconds remaining
        eta: Option<u64>,
        /// Identity of the stream being fetched (usually its file name)
        stream: Option<String>,
    },
    /// One stream finished
    Finished {
        /// Identity of the stream that finished
        stream: Option<String>,
    },
    /// Sequential item `index` (0-based) of `total` has been attempted
    ItemProgress {
        /// Item index
        index: usize,
        /// Item count
        total: usize,
    },
    /// A sequential item finished
    ItemComplete {
        /// The finished item's result
        result: Box<FetchResult>,
    },
}

/// A request to fetch one source
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FetchRequest {
    /// URL or share text containing a URL
    pub url: String,
    /// Output container/format (mp4, mkv, webm, mp3, m4a)
    pub format: String,
    /// Quality label (360p, 480p, 720p, 1080p, best, audio)
    pub quality: String,
    /// Media kind; inferred from quality and metadata when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MediaKind>,
    /// Owner label recorded in history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl FetchRequest {
    /// Request for a merged video+audio artifact
    pub fn video(url: impl Into<String>, format: impl Into<String>, quality: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: format.into(),
            quality: quality.into(),
            kind: None,
            user_id: None,
        }
    }

    /// Request for an extracted audio artifact
    pub fn audio(url: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: format.into(),
            quality: "audio".to_string(),
            kind: Some(MediaKind::AudioOnly),
            user_id: None,
        }
    }
}

/// A request to fetch a list of sources as one batch job
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchRequest {
    /// Sources, processed in order
    pub urls: Vec<String>,
    /// Output container/format for every item
    pub format: String,
    /// Quality label for every item
    pub quality: String,
    /// Owner label recorded in history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl BatchRequest {
    /// The single-item request for `url`
    pub fn item(&self, url: &str) -> FetchRequest {
        FetchRequest {
            url: url.to_string(),
            format: self.format.clone(),
            quality: self.quality.clone(),
            kind: None,
            user_id: self.user_id.clone(),
        }
    }
}

/// Outcome of a successful single-source fetch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FetchResult {
    /// Artifact/history id
    pub download_id: JobId,
    /// Platform-side media id
    pub media_id: Option<String>,
    /// Human title
    pub title: String,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Final artifact location (after rename)
    #[schema(value_type = String)]
    pub file_path: PathBuf,
    /// Artifact size in bytes
    pub file_size: Option<u64>,
    /// Output format
    pub format: String,
    /// Quality label
    pub quality: String,
}

/// Batch item that failed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FailedItem {
    /// The source that was attempted
    pub source: String,
    /// Human-readable failure
    pub error: String,
}

/// Batch item that finished
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CompletedItem {
    /// Artifact/history id of the item
    pub download_id: JobId,
    /// Item title
    pub title: String,
}

/// Persisted record of a finished artifact
///
/// The history table is the source of truth for which artifact files are
/// still wanted: orphan scans never touch a file whose id has a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryRecord {
    /// Artifact id (file prefix before rename)
    pub id: JobId,
    /// Owner label, if the caller supplied one
    pub user_id: Option<String>,
    /// Canonical source URL
    pub source_url: String,
    /// Title
    pub title: String,
    /// Platform-side media id
    pub media_id: Option<String>,
    /// Output format
    pub format: String,
    /// Quality label
    pub quality: String,
    /// Final artifact location
    #[schema(value_type = String)]
    pub file_path: PathBuf,
    /// Artifact size in bytes
    pub file_size: Option<u64>,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// When the record was written
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Record for a finished fetch
    pub fn from_result(result: &FetchResult, source_url: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            id: result.download_id,
            user_id,
            source_url: source_url.into(),
            title: result.title.clone(),
            media_id: result.media_id.clone(),
            format: result.format.clone(),
            quality: result.quality.clone(),
            file_path: result.file_path.clone(),
            file_size: result.file_size,
            duration: result.duration,
            created_at: Utc::now(),
        }
    }
}

/// Metadata returned by extraction strategies
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MediaMetadata {
    /// Platform-side media id
    #[serde(default)]
    pub media_id: Option<String>,
    /// Title
    #[serde(default)]
    pub title: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Uploader / author
    #[serde(default)]
    pub uploader: Option<String>,
    /// Image URLs for slideshow posts
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// Available formats
    #[serde(default)]
    pub formats: Vec<FormatInfo>,
}

impl MediaMetadata {
    /// A result with no id, no title and no images counts as "absent"
    pub fn is_empty(&self) -> bool {
        self.media_id.is_none() && self.title.is_none() && self.image_urls.is_empty()
    }

    /// Whether this is a multi-image post
    pub fn is_slideshow(&self) -> bool {
        !self.image_urls.is_empty()
    }
}

/// One downloadable format advertised by the platform
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FormatInfo {
    /// Backend format id
    pub format_id: String,
    /// Container extension
    pub ext: Option<String>,
    /// Quality label or height
    pub quality: Option<String>,
    /// Size in bytes, exact or approximate
    pub filesize: Option<u64>,
    /// Whether the format carries audio
    pub has_audio: bool,
}
