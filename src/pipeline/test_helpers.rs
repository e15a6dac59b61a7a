//! Scripted media tool and transfer backend for pipeline tests
//!
//! Fake media files are plain text listing their streams, e.g.
//! `video:vp9,audio:aac`, so probes and merges can be checked by reading the
//! file back.

use super::progress::{PhaseSnapshot, ProgressReporter};
use crate::error::{Error, TransferError};
use crate::media_tool::{MediaTool, MediaToolCapabilities, StreamReport};
use crate::transfer::{
    ProgressSink, TransferBackend, TransferCapabilities, TransferOutcome, TransferRequest,
};
use crate::types::{MediaMetadata, Phase, ProgressEvent};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Write a fake media file carrying `streams`
pub(crate) fn write_media(path: &Path, streams: &str) {
    std::fs::write(path, streams).unwrap();
}

/// Read a fake media file's stream list back
pub(crate) fn read_media(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

fn codec_of(content: &str, kind: &str) -> Option<String> {
    content.split(',').find_map(|token| {
        let (k, codec) = token.trim().split_once(':')?;
        (k == kind).then(|| codec.to_string())
    })
}

async fn read_streams(path: &Path) -> crate::Result<String> {
    Ok(tokio::fs::read_to_string(path).await?)
}

/// Media tool that understands the fake file format
#[derive(Default)]
pub(crate) struct StubMediaTool {
    pub fail_codec_types: bool,
    pub fail_transcode: bool,
    pub(crate) merges: AtomicUsize,
    pub(crate) reencodes: AtomicUsize,
}

impl StubMediaTool {
    pub fn merge_calls(&self) -> usize {
        self.merges.load(Ordering::SeqCst)
    }

    pub fn reencode_calls(&self) -> usize {
        self.reencodes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaTool for StubMediaTool {
    async fn probe_streams(&self, path: &Path) -> crate::Result<StreamReport> {
        let content = read_streams(path).await?;
        let video_codec = codec_of(&content, "video");
        let audio_codec = codec_of(&content, "audio");
        Ok(StreamReport {
            has_video: video_codec.is_some(),
            has_audio: audio_codec.is_some(),
            video_codec,
            audio_codec,
        })
    }

    async fn codec_types(&self, path: &Path) -> crate::Result<Vec<String>> {
        if self.fail_codec_types {
            return Err(Error::ExternalTool("probe unavailable".into()));
        }
        let content = read_streams(path).await?;
        Ok(content
            .split(',')
            .filter_map(|token| token.trim().split_once(':').map(|(k, _)| k.to_string()))
            .collect())
    }

    async fn video_codec(&self, path: &Path) -> crate::Result<Option<String>> {
        Ok(codec_of(&read_streams(path).await?, "video"))
    }

    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        _format: &str,
    ) -> crate::Result<()> {
        self.merges.fetch_add(1, Ordering::SeqCst);
        if self.fail_transcode {
            return Err(Error::ExternalTool("merge failed".into()));
        }
        let v = codec_of(&read_streams(video).await?, "video").unwrap_or_default();
        let a = codec_of(&read_streams(audio).await?, "audio").unwrap_or_default();
        tokio::fs::write(output, format!("video:{v},audio:{a}")).await?;
        Ok(())
    }

    async fn reencode_h264(&self, input: &Path, output: &Path) -> crate::Result<()> {
        self.reencodes.fetch_add(1, Ordering::SeqCst);
        if self.fail_transcode {
            tokio::fs::write(output, "").await?;
            return Err(Error::ExternalTool("encoder missing".into()));
        }
        let content = read_streams(input).await?;
        let rewritten: Vec<String> = content
            .split(',')
            .map(|token| {
                if token.starts_with("video:") {
                    "video:h264".to_string()
                } else {
                    token.to_string()
                }
            })
            .collect();
        tokio::fs::write(output, rewritten.join(",")).await?;
        Ok(())
    }

    fn capabilities(&self) -> MediaToolCapabilities {
        MediaToolCapabilities {
            can_probe: true,
            can_transcode: true,
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

type FetchHook = Box<dyn Fn(usize) + Send + Sync>;

/// Transfer backend that replays a script instead of running a process
///
/// Each fetch emits `events` through the sink, then writes every
/// `(suffix, streams)` pair of `files` as `{id}{suffix}` into the request's
/// output directory.
#[derive(Default)]
pub(crate) struct StubBackend {
    pub events: Vec<ProgressEvent>,
    pub files: Vec<(String, String)>,
    pub info: MediaMetadata,
    /// Sources that fail with a backend error
    pub failing_urls: Vec<String>,
    /// Called with the 0-based call index after a fetch succeeds
    pub after_fetch: Option<FetchHook>,
    pub(crate) calls: AtomicUsize,
}

impl StubBackend {
    /// Backend producing one finished file
    pub fn producing(suffix: &str, streams: &str) -> Self {
        Self {
            files: vec![(suffix.to_string(), streams.to_string())],
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferBackend for StubBackend {
    async fn fetch(
        &self,
        request: &TransferRequest,
        sink: &mut ProgressSink<'_>,
        cancel: &CancellationToken,
    ) -> crate::Result<TransferOutcome> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.failing_urls.contains(&request.url) {
            return Err(TransferError::BackendFailed {
                backend: "stub".into(),
                reason: format!("no formats for {}", request.url),
            }
            .into());
        }

        for event in &self.events {
            if sink(event.clone()).is_break() {
                return Err(Error::Cancelled);
            }
        }

        tokio::fs::create_dir_all(&request.output_dir).await?;
        let prefix = request.file_prefix();
        for (suffix, streams) in &self.files {
            tokio::fs::write(request.output_dir.join(format!("{prefix}{suffix}")), streams)
                .await?;
        }

        if let Some(hook) = &self.after_fetch {
            hook(index);
        }
        Ok(TransferOutcome {
            info: self.info.clone(),
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
        "stub"
    }
}

/// Reporter that records every snapshot
///
/// With `cancel_after: Some(n)` it reports cancelled once `n` snapshots
/// have been recorded.
#[derive(Default)]
pub(crate) struct RecordingReporter {
    pub snapshots: Vec<PhaseSnapshot>,
    pub cancel_after: Option<usize>,
}

impl RecordingReporter {
    /// `(phase, progress)` pairs in the order they were reported
    pub fn points(&self) -> Vec<(Phase, f64)> {
        self.snapshots.iter().map(|s| (s.phase, s.progress)).collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&mut self, snapshot: PhaseSnapshot) {
        self.snapshots.push(snapshot);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_after
            .is_some_and(|n| self.snapshots.len() >= n)
    }
}

/// A `Downloading` event for `stream` at `done` of `total` bytes
pub(crate) fn downloading(done: u64, total: u64, stream: &str) -> ProgressEvent {
    ProgressEvent::Downloading {
        bytes_total: Some(total),
        bytes_done: done,
        speed: Some(1_000_000.0),
        eta: Some(1),
        stream: Some(stream.to_string()),
    }
}
