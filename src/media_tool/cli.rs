//! CLI-based media tool using external ffmpeg and ffprobe binaries

use super::probe::{
    merge_args, parse_codec_types, parse_stream_report, parse_video_codec, reencode_args,
};
use super::traits::{MediaTool, MediaToolCapabilities, StreamReport};
use crate::config::ToolsConfig;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Media tool backed by the `ffmpeg` and `ffprobe` executables
///
/// # Examples
///
/// ```no_run
/// use media_fetch::media_tool::{FfmpegCli, MediaTool};
/// use std::path::{Path, PathBuf};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Explicit paths
/// let tool = FfmpegCli::new(PathBuf::from("/usr/bin/ffmpeg"), PathBuf::from("/usr/bin/ffprobe"));
///
/// // Or auto-discover from PATH
/// let tool = FfmpegCli::from_path().expect("ffmpeg not found in PATH");
///
/// let codec = tool.video_codec(Path::new("clip.mp4")).await?;
/// # Ok(())
/// # }
/// ```
pub struct FfmpegCli {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    probe_timeout: Duration,
    merge_timeout: Duration,
}

impl FfmpegCli {
    /// Create a tool with explicit binary paths and default timeouts
    pub fn new(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        let defaults = ToolsConfig::default();
        Self {
            ffmpeg_path,
            ffprobe_path,
            probe_timeout: defaults.probe_timeout,
            merge_timeout: defaults.merge_timeout,
        }
    }

    /// Override the probe and merge timeouts
    pub fn with_timeouts(mut self, probe_timeout: Duration, merge_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self.merge_timeout = merge_timeout;
        self
    }

    /// Attempt to find ffmpeg and ffprobe in PATH
    ///
    /// # Returns
    ///
    /// `Some(FfmpegCli)` if both binaries are found, `None` otherwise.
    pub fn from_path() -> Option<Self> {
        let ffmpeg = which::which("ffmpeg").ok()?;
        let ffprobe = which::which("ffprobe").ok()?;
        Some(Self::new(ffmpeg, ffprobe))
    }

    /// Build from configuration
    ///
    /// `ffmpeg_path` may name the binary or the directory that contains it.
    /// ffprobe is taken from `ffprobe_path`, then from next to ffmpeg, then from
    /// PATH (when `search_path` is set).
    pub fn from_config(tools: &ToolsConfig) -> Option<Self> {
        let ffmpeg = match &tools.ffmpeg_path {
            Some(path) if path.is_dir() => Some(path.join(binary_name("ffmpeg"))),
            Some(path) => Some(path.clone()),
            None if tools.search_path => which::which("ffmpeg").ok(),
            None => None,
        }?;

        let sibling = ffmpeg.parent().map(|dir| dir.join(binary_name("ffprobe")));
        let ffprobe = match &tools.ffprobe_path {
            Some(path) => Some(path.clone()),
            None => match sibling {
                Some(path) if path.exists() => Some(path),
                _ if tools.search_path => which::which("ffprobe").ok(),
                _ => None,
            },
        }?;

        Some(
            Self::new(ffmpeg, ffprobe).with_timeouts(tools.probe_timeout, tools.merge_timeout),
        )
    }

    async fn run(
        &self,
        binary: &Path,
        args: Vec<OsString>,
        limit: Duration,
    ) -> crate::Result<Output> {
        let name = binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| binary.display().to_string());

        let mut command = Command::new(binary);
        command.args(&args).kill_on_drop(true);

        match tokio::time::timeout(limit, command.output()).await {
            Ok(result) => result
                .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute {}: {}", name, e))),
            Err(_) => Err(crate::Error::ExternalTool(format!(
                "{} timed out after {}s",
                name,
                limit.as_secs()
            ))),
        }
    }

    async fn probe(&self, args: Vec<OsString>) -> crate::Result<Output> {
        let output = self.run(&self.ffprobe_path, args, self.probe_timeout).await?;
        if !output.status.success() {
            return Err(crate::Error::ExternalTool(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    async fn transcode(&self, args: Vec<OsString>, output_path: &Path) -> crate::Result<()> {
        let output = self.run(&self.ffmpeg_path, args, self.merge_timeout).await?;

        let size = tokio::fs::metadata(output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(crate::Error::ExternalTool(format!(
                "ffmpeg produced no output at {} ({}): {}",
                output_path.display(),
                output.status,
                last_line(&output.stderr)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaTool for FfmpegCli {
    async fn probe_streams(&self, path: &Path) -> crate::Result<StreamReport> {
        let args = vec![
            "-v".into(),
            "quiet".into(),
            "-show_streams".into(),
            "-of".into(),
            "json".into(),
            path.into(),
        ];
        let output = self.probe(args).await?;
        parse_stream_report(&output.stdout)
    }

    async fn codec_types(&self, path: &Path) -> crate::Result<Vec<String>> {
        let args = vec![
            "-v".into(),
            "quiet".into(),
            "-show_entries".into(),
            "stream=codec_type".into(),
            "-of".into(),
            "csv=p=0".into(),
            path.into(),
        ];
        let output = self.probe(args).await?;
        Ok(parse_codec_types(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn video_codec(&self, path: &Path) -> crate::Result<Option<String>> {
        let args = vec![
            "-v".into(),
            "quiet".into(),
            "-select_streams".into(),
            "v:0".into(),
            "-show_entries".into(),
            "stream=codec_name".into(),
            "-of".into(),
            "csv=p=0".into(),
            path.into(),
        ];
        let output = self.probe(args).await?;
        Ok(parse_video_codec(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        format: &str,
    ) -> crate::Result<()> {
        self.transcode(merge_args(video, audio, output, format), output)
            .await
    }

    async fn reencode_h264(&self, input: &Path, output: &Path) -> crate::Result<()> {
        self.transcode(reencode_args(input, output), output).await
    }

    fn capabilities(&self) -> MediaToolCapabilities {
        MediaToolCapabilities {
            can_probe: true,
            can_transcode: true,
        }
    }

    fn name(&self) -> &'static str {
        "cli-ffmpeg"
    }
}

fn binary_name(base: &str) -> String {
    if cfg!(windows) {
        format!("{base}.exe")
    } else {
        base.to_string()
    }
}

fn last_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}
