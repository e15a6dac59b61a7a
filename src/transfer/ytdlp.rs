//! Transfer backend driving the `yt-dlp` executable

use super::traits::{
    ProgressSink, TransferBackend, TransferCapabilities, TransferOutcome, TransferRequest,
};
use crate::config::ToolsConfig;
use crate::error::{Error, TransferError};
use crate::extraction::metadata_from_info;
use crate::types::{MediaKind, MediaMetadata, ProgressEvent};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Marker that prefixes every machine-readable progress line
const PROGRESS_MARKER: &str = "MFPROG";

/// Seven space-separated fields; the file name goes last so it may contain spaces
const PROGRESS_TEMPLATE: &str = "download:MFPROG %(progress.status)s %(progress.downloaded_bytes)s \
     %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s \
     %(progress.eta)s %(progress.filename)s";

/// Containers yt-dlp can merge into directly
const MERGE_CONTAINERS: &[&str] = &["mp4", "mkv", "webm"];

/// Backend that shells out to yt-dlp and parses its progress lines
///
/// # Examples
///
/// ```no_run
/// use media_fetch::transfer::YtDlpBackend;
/// use std::path::PathBuf;
///
/// // Explicit path, telling yt-dlp where ffmpeg lives
/// let backend = YtDlpBackend::new(PathBuf::from("/usr/local/bin/yt-dlp"))
///     .with_ffmpeg_location(PathBuf::from("/opt/ffmpeg/bin"));
///
/// // Or auto-discover from PATH
/// let backend = YtDlpBackend::from_path().expect("yt-dlp not found in PATH");
/// ```
pub struct YtDlpBackend {
    binary_path: PathBuf,
    ffmpeg_location: Option<PathBuf>,
}

impl YtDlpBackend {
    /// Create a backend with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            ffmpeg_location: None,
        }
    }

    /// Pass `--ffmpeg-location` so yt-dlp can merge and convert
    pub fn with_ffmpeg_location(mut self, location: PathBuf) -> Self {
        self.ffmpeg_location = Some(location);
        self
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Build from configuration, honouring `ytdlp_path` and `search_path`
    pub fn from_config(tools: &ToolsConfig) -> Option<Self> {
        let binary = locate_ytdlp(tools)?;
        let backend = Self::new(binary);
        Some(match &tools.ffmpeg_path {
            Some(location) => backend.with_ffmpeg_location(location.clone()),
            None => backend,
        })
    }

    /// Path of the yt-dlp executable
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn build_args(&self, request: &TransferRequest) -> Vec<OsString> {
        let template = request
            .output_dir
            .join(format!("{}.%(ext)s", request.file_prefix()));

        let mut args: Vec<OsString> = [
            "--quiet",
            "--no-warnings",
            "--no-playlist",
            "--newline",
            "--progress",
            "--progress-template",
            PROGRESS_TEMPLATE,
            "--write-info-json",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push("-o".into());
        args.push(template.into());

        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".into());
            args.push(location.into());
        }

        let format = request.format.to_ascii_lowercase();
        if request.kind == MediaKind::AudioOnly {
            args.extend(
                [
                    "-f",
                    "bestaudio/best",
                    "-x",
                    "--audio-format",
                    format.as_str(),
                    "--audio-quality",
                    "192K",
                ]
                .iter()
                .map(OsString::from),
            );
        } else {
            args.push("-f".into());
            args.push(format_selector(&request.quality, &format).into());
            if MERGE_CONTAINERS.contains(&format.as_str()) {
                args.push("--merge-output-format".into());
                args.push(format.as_str().into());
            }
            if format == "mp4" {
                args.push("--postprocessor-args".into());
                args.push("Merger:-c:v copy -c:a aac -b:a 192k".into());
            }
        }

        args.push("--".into());
        args.push(request.url.as_str().into());
        args
    }
}

#[async_trait]
impl TransferBackend for YtDlpBackend {
    async fn fetch(
        &self,
        request: &TransferRequest,
        sink: &mut ProgressSink<'_>,
        cancel: &CancellationToken,
    ) -> crate::Result<TransferOutcome> {
        tokio::fs::create_dir_all(&request.output_dir).await?;

        let args = self.build_args(request);
        tracing::debug!(job_id = %request.id, url = %request.url, "starting yt-dlp");

        let mut child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stderr was not captured".into()))?;

        // Keep the most useful stderr line for the failure message
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut last_error: Option<String> = None;
            let mut last_line: Option<String> = None;
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if line.starts_with("ERROR:") {
                    last_error = Some(line.clone());
                }
                last_line = Some(line);
            }
            last_error.or(last_line)
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    abort(&mut child, request).await;
                    return Err(Error::Cancelled);
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            let Some(event) = parse_progress_line(&line) else {
                continue;
            };
            if sink(event).is_break() {
                abort(&mut child, request).await;
                return Err(Error::Cancelled);
            }
        }

        let status = child.wait().await?;
        let stderr_summary = stderr_task.await.ok().flatten();

        if !status.success() {
            return Err(TransferError::BackendFailed {
                backend: self.name().to_string(),
                reason: stderr_summary.unwrap_or_else(|| format!("yt-dlp exited with {}", status)),
            }
            .into());
        }

        let info = take_info_json(&request.output_dir, &request.file_prefix()).await;
        Ok(TransferOutcome {
            info,
            output_dir: request.output_dir.clone(),
        })
    }

    fn capabilities(&self) -> TransferCapabilities {
        TransferCapabilities {
            merges_streams: true,
            extracts_audio: true,
        }
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Resolve the yt-dlp executable from configuration or PATH
pub fn locate_ytdlp(tools: &ToolsConfig) -> Option<PathBuf> {
    match &tools.ytdlp_path {
        Some(path) => Some(path.clone()),
        None if tools.search_path => which::which("yt-dlp").ok(),
        None => None,
    }
}

/// yt-dlp format selector for a quality label and target container
///
/// Unknown labels fall back to 720p. For mp4 an H.264 (`avc1`) video stream
/// is preferred so the container plays everywhere.
pub fn format_selector(quality: &str, format: &str) -> String {
    let prefer_avc = format.eq_ignore_ascii_case("mp4");
    let height = match quality {
        "audio" => return "bestaudio/best".to_string(),
        "best" => None,
        "360p" => Some(360),
        "480p" => Some(480),
        "1080p" => Some(1080),
        _ => Some(720),
    };

    match (height, prefer_avc) {
        (None, false) => "bestvideo+bestaudio/best".to_string(),
        (None, true) => "bestvideo[vcodec^=avc1]+bestaudio/bestvideo+bestaudio/best".to_string(),
        (Some(h), false) => format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]"),
        (Some(h), true) => format!(
            "bestvideo[height<={h}][vcodec^=avc1]+bestaudio/bestvideo[height<={h}]+bestaudio/best[height<={h}]"
        ),
    }
}

/// Parse one line written through [`PROGRESS_TEMPLATE`]
///
/// Lines without the marker (or with an unknown status) yield `None`.
pub(crate) fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?.trim_start();
    let mut fields = rest.splitn(7, ' ');

    let status = fields.next()?;
    let downloaded = number(fields.next()?);
    let total = number(fields.next()?);
    let estimate = number(fields.next()?);
    let speed = number(fields.next()?);
    let eta = number(fields.next()?);
    let stream = fields
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "NA")
        .map(|name| {
            Path::new(name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.to_string())
        });

    match status {
        "downloading" => Some(ProgressEvent::Downloading {
            bytes_total: total.or(estimate).map(|v| v as u64),
            bytes_done: downloaded.map(|v| v as u64).unwrap_or(0),
            speed,
            eta: eta.map(|v| v as u64),
            stream,
        }),
        "finished" => Some(ProgressEvent::Finished { stream }),
        _ => None,
    }
}

// yt-dlp renders missing values as "NA"
fn number(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

async fn abort(child: &mut Child, request: &TransferRequest) {
    tracing::info!(job_id = %request.id, "cancelling yt-dlp transfer");
    if let Err(e) = child.kill().await {
        tracing::warn!(job_id = %request.id, error = %e, "failed to kill yt-dlp");
    }
}

/// Read and remove `{prefix}.info.json`; missing or unreadable files yield empty metadata
async fn take_info_json(dir: &Path, prefix: &str) -> MediaMetadata {
    let path = dir.join(format!("{prefix}.info.json"));
    let info = match tokio::fs::read(&path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => metadata_from_info(&value),
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "unreadable yt-dlp info file");
                MediaMetadata::default()
            }
        },
        Err(e) => {
            tracing::debug!(path = ?path, error = %e, "no yt-dlp info file");
            return MediaMetadata::default();
        }
    };

    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!(path = ?path, error = %e, "failed to remove yt-dlp info file");
    }
    info
}
