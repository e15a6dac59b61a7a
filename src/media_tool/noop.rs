//! No-op media tool for graceful degradation

use super::traits::{MediaTool, MediaToolCapabilities, StreamReport};
use async_trait::async_trait;
use std::path::Path;

/// Media tool used when ffmpeg is unavailable
///
/// Every operation returns `Error::NotSupported`. The pipeline treats that as
/// "cannot verify" and serves the artifact as produced by the transfer backend.
///
/// # Examples
///
/// ```
/// use media_fetch::media_tool::{MediaTool, NoOpMediaTool};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tool = NoOpMediaTool;
/// assert!(tool.probe_streams(Path::new("clip.mp4")).await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct NoOpMediaTool;

fn unsupported(operation: &str) -> crate::Error {
    crate::Error::NotSupported(format!(
        "{operation} requires ffmpeg/ffprobe. \
         Configure tools.ffmpeg_path or ensure ffmpeg is in PATH."
    ))
}

#[async_trait]
impl MediaTool for NoOpMediaTool {
    async fn probe_streams(&self, _path: &Path) -> crate::Result<StreamReport> {
        Err(unsupported("Stream probing"))
    }

    async fn codec_types(&self, _path: &Path) -> crate::Result<Vec<String>> {
        Err(unsupported("Stream probing"))
    }

    async fn video_codec(&self, _path: &Path) -> crate::Result<Option<String>> {
        Err(unsupported("Codec probing"))
    }

    async fn merge(
        &self,
        _video: &Path,
        _audio: &Path,
        _output: &Path,
        _format: &str,
    ) -> crate::Result<()> {
        Err(unsupported("Stream merging"))
    }

    async fn reencode_h264(&self, _input: &Path, _output: &Path) -> crate::Result<()> {
        Err(unsupported("Re-encoding"))
    }

    fn capabilities(&self) -> MediaToolCapabilities {
        MediaToolCapabilities {
            can_probe: false,
            can_transcode: false,
        }
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
