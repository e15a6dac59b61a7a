//! Metadata extraction through `yt-dlp -J`

use super::strategy::ExtractionStrategy;
use crate::error::{Error, TransferError};
use crate::types::{FormatInfo, MediaMetadata};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Strategy that asks yt-dlp for the info dictionary without downloading
pub struct YtDlpStrategy {
    binary_path: PathBuf,
    timeout: Duration,
}

impl YtDlpStrategy {
    /// Create a strategy with an explicit yt-dlp path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            timeout: Duration::from_secs(60),
        }
    }

    /// Override how long a single lookup may take (default: 60 seconds)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ExtractionStrategy for YtDlpStrategy {
    async fn extract(&self, url: &str) -> crate::Result<Option<MediaMetadata>> {
        let mut command = Command::new(&self.binary_path);
        command
            .arg("-J")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg(url)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| Error::ExternalTool(format!("yt-dlp timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransferError::BackendFailed {
                backend: "yt-dlp".into(),
                reason: stderr.lines().last().unwrap_or("unknown error").trim().to_string(),
            }
            .into());
        }

        let info: Value = serde_json::from_slice(&output.stdout)?;
        Ok(Some(metadata_from_info(&info)))
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Map a yt-dlp info dictionary to [`MediaMetadata`]
///
/// Only formats that carry video are listed, matching what a client can pick
/// for a video download.
pub(crate) fn metadata_from_info(info: &Value) -> MediaMetadata {
    let text = |key: &str| info.get(key).and_then(Value::as_str).map(str::to_string);

    let formats = info
        .get("formats")
        .and_then(Value::as_array)
        .map(|formats| {
            formats
                .iter()
                .filter(|f| f.get("vcodec").and_then(Value::as_str) != Some("none"))
                .map(|f| FormatInfo {
                    format_id: f
                        .get("format_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    ext: f.get("ext").and_then(Value::as_str).map(str::to_string),
                    quality: f
                        .get("format_note")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or_else(|| f.get("height").and_then(Value::as_u64).map(|h| format!("{h}p"))),
                    filesize: f
                        .get("filesize")
                        .and_then(Value::as_u64)
                        .or_else(|| f.get("filesize_approx").and_then(Value::as_u64)),
                    has_audio: f.get("acodec").and_then(Value::as_str) != Some("none"),
                })
                .collect()
        })
        .unwrap_or_default();

    MediaMetadata {
        media_id: text("id"),
        title: text("title"),
        duration: info.get("duration").and_then(Value::as_f64),
        thumbnail: text("thumbnail"),
        uploader: text("uploader"),
        image_urls: Vec::new(),
        formats,
    }
}
