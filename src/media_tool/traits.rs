//! Traits and types for media tool integration

use async_trait::async_trait;
use std::path::Path;

/// Component streams found in an artifact
#[must_use]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamReport {
    /// At least one video stream is present
    pub has_video: bool,
    /// At least one audio stream is present
    pub has_audio: bool,
    /// Codec of the first video stream
    pub video_codec: Option<String>,
    /// Codec of the first audio stream
    pub audio_codec: Option<String>,
}

impl StreamReport {
    /// Both a video and an audio stream are present
    pub fn is_complete(&self) -> bool {
        self.has_video && self.has_audio
    }
}

/// What an intermediate file carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClass {
    /// Video (possibly with audio)
    Video,
    /// Audio only
    Audio,
    /// Could not be classified
    Unknown,
}

impl StreamClass {
    /// Classify from probed `codec_type` values; video wins over audio
    pub fn from_codec_types<S: AsRef<str>>(types: &[S]) -> Self {
        if types.iter().any(|t| t.as_ref() == "video") {
            StreamClass::Video
        } else if types.iter().any(|t| t.as_ref() == "audio") {
            StreamClass::Audio
        } else {
            StreamClass::Unknown
        }
    }

    /// Classify by file extension when probing is unavailable
    pub fn from_extension(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("m4a" | "ogg" | "opus" | "weba") => StreamClass::Audio,
            Some("mp4" | "webm" | "mkv") => StreamClass::Video,
            _ => StreamClass::Unknown,
        }
    }
}

/// Capabilities of a media tool implementation
#[derive(Debug, Clone, Copy)]
pub struct MediaToolCapabilities {
    /// Can inspect streams and codecs
    pub can_probe: bool,
    /// Can mux separate streams and re-encode video
    pub can_transcode: bool,
}

/// Trait for the external media tool
///
/// Every call is bounded (implementations apply a timeout) and runs to
/// completion before returning; none of them report progress.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// List the component streams of `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the tool cannot be executed, times out, or exits
    /// unsuccessfully.
    async fn probe_streams(&self, path: &Path) -> crate::Result<StreamReport>;

    /// `codec_type` of every stream in `path` (e.g. `["video"]`)
    async fn codec_types(&self, path: &Path) -> crate::Result<Vec<String>>;

    /// Codec name of the first video stream, `None` if the tool printed nothing
    async fn video_codec(&self, path: &Path) -> crate::Result<Option<String>>;

    /// Mux `video` and `audio` into `output` for the target container `format`
    ///
    /// Succeeds only if `output` exists and is non-empty afterwards.
    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        format: &str,
    ) -> crate::Result<()>;

    /// Re-encode the video stream of `input` to H.264 into `output`, copying audio
    async fn reencode_h264(&self, input: &Path, output: &Path) -> crate::Result<()>;

    /// Query capabilities of this tool
    fn capabilities(&self) -> MediaToolCapabilities;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_types_prefer_video() {
        assert_eq!(
            StreamClass::from_codec_types(&["audio", "video"]),
            StreamClass::Video
        );
        assert_eq!(StreamClass::from_codec_types(&["audio"]), StreamClass::Audio);
        assert_eq!(
            StreamClass::from_codec_types::<&str>(&[]),
            StreamClass::Unknown
        );
    }

    #[test]
    fn extension_fallback_matches_known_containers() {
        assert_eq!(
            StreamClass::from_extension(Path::new("x.f140.M4A")),
            StreamClass::Audio
        );
        assert_eq!(
            StreamClass::from_extension(Path::new("x.f251.weba")),
            StreamClass::Audio
        );
        assert_eq!(
            StreamClass::from_extension(Path::new("x.f137.mp4")),
            StreamClass::Video
        );
        assert_eq!(
            StreamClass::from_extension(Path::new("x.f1.txt")),
            StreamClass::Unknown
        );
    }
}
