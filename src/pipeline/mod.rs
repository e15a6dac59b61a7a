//! Media fetch pipeline
//!
//! Drives one source from transfer to a finished, human-named artifact:
//!
//! 1. Report `starting` and pick the [`MediaKind`] (and with it the phase bands)
//! 2. Transfer through the [`TransferBackend`] or, for slideshows, the
//!    [`ImageFetcher`], mapping every [`ProgressEvent`] onto the bands
//! 3. Locate the produced artifact and verify it carries every required stream,
//!    falling back to a manual merge of the intermediates
//! 4. Repair codec/container mismatches (mp4 must carry H.264)
//! 5. Remove leftovers sharing the artifact id and rename to the sanitized title
//!
//! Cancellation is observed through the [`ProgressReporter`] on every progress
//! event. The pipeline never writes a terminal state; callers do.

mod finalize;
mod progress;
mod repair;
mod slideshow;
mod verify;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use progress::{JobReporter, PhaseSnapshot, ProgressReporter, ProgressTracker};
pub(crate) use slideshow::scratch_dir;

use crate::config::PhaseConfig;
use crate::error::{Result, TransferError};
use crate::extraction::normalize_url;
use crate::media_tool::MediaTool;
use crate::transfer::{ImageFetcher, TransferBackend, TransferRequest};
use crate::types::{FetchRequest, FetchResult, JobId, MediaKind, MediaMetadata, ProgressEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Shared, stateless driver for pipeline runs
///
/// One instance serves every job; per-run state lives in the
/// [`ProgressTracker`] created by [`run`](Pipeline::run).
pub struct Pipeline {
    backend: Arc<dyn TransferBackend>,
    media_tool: Arc<dyn MediaTool>,
    images: ImageFetcher,
    phases: PhaseConfig,
    download_dir: PathBuf,
}

impl Pipeline {
    /// Create a pipeline writing artifacts into `download_dir`
    pub fn new(
        backend: Arc<dyn TransferBackend>,
        media_tool: Arc<dyn MediaTool>,
        images: ImageFetcher,
        phases: PhaseConfig,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            backend,
            media_tool,
            images,
            phases,
            download_dir,
        }
    }

    /// Directory shared by all artifacts
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Decide which media kind a request produces
    ///
    /// An explicit kind wins; otherwise image lists mean a slideshow, the
    /// `audio` quality means audio-only, and a platform that only advertises
    /// formats with audio included means a single muxed stream.
    pub fn infer_kind(request: &FetchRequest, metadata: &MediaMetadata) -> MediaKind {
        if let Some(kind) = request.kind {
            return kind;
        }
        if metadata.is_slideshow() {
            return MediaKind::Slideshow;
        }
        if request.quality.eq_ignore_ascii_case("audio") {
            return MediaKind::AudioOnly;
        }
        if !metadata.formats.is_empty() && metadata.formats.iter().all(|f| f.has_audio) {
            return MediaKind::SingleStream;
        }
        MediaKind::VideoAudio
    }

    /// Run one source to a finished artifact named `artifact_id` until renamed
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`](crate::Error::Cancelled) when the reporter signals
    /// cancellation, [`Error::Transfer`](crate::Error::Transfer) when the
    /// backend fails or produced nothing. Stream integrity and repair problems
    /// are logged, never returned.
    pub async fn run(
        &self,
        request: &FetchRequest,
        metadata: &MediaMetadata,
        artifact_id: JobId,
        reporter: &mut dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<FetchResult> {
        let kind = Self::infer_kind(request, metadata);
        let mut tracker = ProgressTracker::new(reporter, self.phases.for_kind(kind).clone());
        tracker.start();
        tracker.ensure_active()?;

        let transfer = TransferRequest {
            id: artifact_id,
            url: normalize_url(&request.url),
            format: request.format.clone(),
            quality: request.quality.clone(),
            kind,
            output_dir: self.download_dir.clone(),
        };
        info!(
            job_id = %artifact_id,
            url = %transfer.url,
            kind = ?kind,
            format = %transfer.format,
            quality = %transfer.quality,
            "pipeline started"
        );

        let (path, info) = match kind {
            MediaKind::Slideshow => {
                let zip = self.run_slideshow(&transfer, metadata, &mut tracker, cancel).await?;
                (zip, MediaMetadata::default())
            }
            _ => self.run_transfer(&transfer, &mut tracker, cancel).await?,
        };

        let title = metadata
            .title
            .clone()
            .or(info.title)
            .unwrap_or_else(|| "untitled".to_string());
        let suffix = if kind == MediaKind::Slideshow {
            "_slideshow"
        } else {
            ""
        };
        let file_path = finalize::rename_to_title(path, &title, suffix).await;
        let file_size = tokio::fs::metadata(&file_path).await.ok().map(|m| m.len());

        info!(job_id = %artifact_id, path = ?file_path, size = ?file_size, "pipeline finished");
        Ok(FetchResult {
            download_id: artifact_id,
            media_id: metadata.media_id.clone().or(info.media_id),
            title,
            duration: metadata.duration.or(info.duration),
            file_path,
            file_size,
            format: if kind == MediaKind::Slideshow {
                "zip".to_string()
            } else {
                request.format.clone()
            },
            quality: request.quality.clone(),
        })
    }

    async fn run_transfer(
        &self,
        transfer: &TransferRequest,
        tracker: &mut ProgressTracker<'_>,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, MediaMetadata)> {
        let outcome = {
            let mut sink = |event: ProgressEvent| tracker.on_event(event);
            self.backend.fetch(transfer, &mut sink, cancel).await?
        };
        debug!(
            job_id = %transfer.id,
            backend = self.backend.name(),
            streams = tracker.stream_count(),
            "transfer complete"
        );
        tracker.finalize();

        let prefix = transfer.file_prefix();
        let dir = outcome.output_dir.as_path();
        let found = verify::find_output_file(dir, &prefix, &transfer.format)
            .await
            .ok_or_else(|| TransferError::OutputMissing {
                dir: dir.to_path_buf(),
            })?;

        let path = match transfer.kind {
            MediaKind::AudioOnly => found,
            _ => {
                let path = verify::ensure_complete_streams(
                    self.media_tool.as_ref(),
                    found,
                    &prefix,
                    &transfer.format,
                )
                .await;
                if transfer.format.eq_ignore_ascii_case("mp4") {
                    repair::ensure_mp4_h264(self.media_tool.as_ref(), &path).await;
                }
                path
            }
        };

        let removed = finalize::cleanup_intermediates(dir, &prefix, &path).await;
        if removed > 0 {
            debug!(job_id = %transfer.id, removed, "removed leftover files");
        }
        Ok((path, outcome.info))
    }

    async fn run_slideshow(
        &self,
        transfer: &TransferRequest,
        metadata: &MediaMetadata,
        tracker: &mut ProgressTracker<'_>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let scratch = slideshow::scratch_dir(&self.download_dir, transfer.id);
        let packaged = self
            .package_slideshow(transfer, metadata, &scratch, tracker, cancel)
            .await;
        slideshow::remove_scratch(&scratch).await;
        packaged
    }

    async fn package_slideshow(
        &self,
        transfer: &TransferRequest,
        metadata: &MediaMetadata,
        scratch: &Path,
        tracker: &mut ProgressTracker<'_>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        info!(job_id = %transfer.id, images = metadata.image_urls.len(), "fetching slideshow images");
        let images = {
            let mut sink = |event: ProgressEvent| tracker.on_event(event);
            self.images
                .fetch_all(&metadata.image_urls, scratch, &mut sink, cancel)
                .await?
        };

        tracker.finalize();
        let zip_path = self.download_dir.join(format!("{}.zip", transfer.file_prefix()));
        slideshow::write_archive(images, zip_path).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("backend", &self.backend.name())
            .field("media_tool", &self.media_tool.name())
            .field("download_dir", &self.download_dir)
            .finish()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::test_helpers::{
        RecordingReporter, StubBackend, StubMediaTool, downloading, read_media,
    };
    use super::*;
    use crate::error::Error;
    use crate::types::{FormatInfo, Phase};
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pipeline(dir: &Path, backend: Arc<StubBackend>, tool: Arc<StubMediaTool>) -> Pipeline {
        Pipeline::new(
            backend,
            tool,
            ImageFetcher::new(Duration::from_secs(5)).unwrap(),
            PhaseConfig::default(),
            dir.to_path_buf(),
        )
    }

    fn titled(title: &str) -> MediaMetadata {
        MediaMetadata {
            media_id: Some("m-1".into()),
            title: Some(title.into()),
            duration: Some(12.5),
            ..Default::default()
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn kind_inference() {
        let video = FetchRequest::video("https://v.example.com/1", "mp4", "720p");
        assert_eq!(
            Pipeline::infer_kind(&video, &MediaMetadata::default()),
            MediaKind::VideoAudio
        );

        let audio = FetchRequest::video("https://v.example.com/1", "mp3", "audio");
        assert_eq!(
            Pipeline::infer_kind(&audio, &MediaMetadata::default()),
            MediaKind::AudioOnly
        );

        let muxed = MediaMetadata {
            formats: vec![FormatInfo {
                format_id: "18".into(),
                has_audio: true,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(Pipeline::infer_kind(&video, &muxed), MediaKind::SingleStream);

        let slides = MediaMetadata {
            image_urls: vec!["https://img.example.com/1.jpg".into()],
            ..Default::default()
        };
        assert_eq!(Pipeline::infer_kind(&video, &slides), MediaKind::Slideshow);

        let forced = FetchRequest {
            kind: Some(MediaKind::SingleStream),
            ..video
        };
        assert_eq!(
            Pipeline::infer_kind(&forced, &slides),
            MediaKind::SingleStream
        );
    }

    #[tokio::test]
    async fn video_audio_phase_sequence() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(StubBackend {
            events: vec![
                downloading(50, 100, "f137.mp4"),
                downloading(100, 100, "f137.mp4"),
                downloading(50, 100, "f140.m4a"),
                ProgressEvent::Finished {
                    stream: Some("f140.m4a".into()),
                },
            ],
            ..StubBackend::producing(".mp4", "video:h264,audio:aac")
        });
        let tool = Arc::new(StubMediaTool::default());
        let pipeline = pipeline(dir.path(), backend, tool.clone());

        let mut reporter = RecordingReporter::default();
        let id = JobId::new();
        let result = pipeline
            .run(
                &FetchRequest::video("https://v.example.com/watch?v=1", "mp4", "720p"),
                &titled("Scenario A"),
                id,
                &mut reporter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            reporter.points(),
            vec![
                (Phase::Starting, 0.0),
                (Phase::DownloadingPrimary, 25.0),
                (Phase::DownloadingPrimary, 50.0),
                (Phase::DownloadingSecondary, 70.0),
                (Phase::DownloadingSecondary, 90.0),
                (Phase::Merging, 90.0),
            ]
        );
        assert_eq!(result.download_id, id);
        assert_eq!(result.title, "Scenario A");
        assert_eq!(result.media_id.as_deref(), Some("m-1"));
        assert_eq!(result.file_path, dir.path().join("Scenario A.mp4"));
        assert_eq!(result.file_size, Some(20));
        assert_eq!(tool.merge_calls(), 0);
        assert_eq!(files_in(dir.path()), vec!["Scenario A.mp4"]);
    }

    #[tokio::test]
    async fn separate_streams_are_merged_and_intermediates_removed() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(StubBackend {
            files: vec![
                (".f137.mp4".into(), "video:h264".into()),
                (".f140.m4a".into(), "audio:aac".into()),
            ],
            ..Default::default()
        });
        let tool = Arc::new(StubMediaTool::default());
        let pipeline = pipeline(dir.path(), backend, tool.clone());

        let result = pipeline
            .run(
                &FetchRequest::video("https://v.example.com/2", "mp4", "1080p"),
                &titled("Split"),
                JobId::new(),
                &mut RecordingReporter::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(tool.merge_calls(), 1);
        assert_eq!(result.file_path, dir.path().join("Split.mp4"));
        assert_eq!(read_media(&result.file_path), "video:h264,audio:aac");
        assert_eq!(files_in(dir.path()), vec!["Split.mp4"]);
    }

    #[tokio::test]
    async fn mp4_with_incompatible_codec_is_reencoded() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(StubBackend::producing(".mp4", "video:vp9,audio:opus"));
        let tool = Arc::new(StubMediaTool::default());
        let pipeline = pipeline(dir.path(), backend, tool.clone());

        let result = pipeline
            .run(
                &FetchRequest::video("https://v.example.com/3", "mp4", "best"),
                &titled("Codec"),
                JobId::new(),
                &mut RecordingReporter::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(tool.reencode_calls(), 1);
        assert_eq!(read_media(&result.file_path), "video:h264,audio:opus");
    }

    #[tokio::test]
    async fn audio_job_skips_stream_verification() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(StubBackend {
            files: vec![
                (".mp3".into(), "audio:mp3".into()),
                (".webm".into(), "audio:opus".into()),
            ],
            ..Default::default()
        });
        let tool = Arc::new(StubMediaTool::default());
        let pipeline = pipeline(dir.path(), backend, tool.clone());

        let mut reporter = RecordingReporter::default();
        let result = pipeline
            .run(
                &FetchRequest::audio("https://v.example.com/4", "mp3"),
                &titled("Song"),
                JobId::new(),
                &mut reporter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.file_path, dir.path().join("Song.mp3"));
        assert_eq!(tool.merge_calls(), 0);
        assert_eq!(tool.reencode_calls(), 0);
        assert_eq!(reporter.points().last(), Some(&(Phase::Converting, 90.0)));
        assert_eq!(files_in(dir.path()), vec!["Song.mp3"]);
    }

    #[tokio::test]
    async fn title_falls_back_to_backend_info() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(StubBackend {
            info: MediaMetadata {
                media_id: Some("backend-id".into()),
                title: Some("From Backend".into()),
                ..Default::default()
            },
            ..StubBackend::producing(".mp4", "video:h264,audio:aac")
        });
        let pipeline = pipeline(dir.path(), backend, Arc::new(StubMediaTool::default()));

        let result = pipeline
            .run(
                &FetchRequest::video("https://v.example.com/5", "mp4", "720p"),
                &MediaMetadata::default(),
                JobId::new(),
                &mut RecordingReporter::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.title, "From Backend");
        assert_eq!(result.media_id.as_deref(), Some("backend-id"));
    }

    #[tokio::test]
    async fn missing_output_is_a_transfer_error() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(
            dir.path(),
            Arc::new(StubBackend::default()),
            Arc::new(StubMediaTool::default()),
        );

        let err = pipeline
            .run(
                &FetchRequest::video("https://v.example.com/6", "mp4", "720p"),
                &titled("Nothing"),
                JobId::new(),
                &mut RecordingReporter::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transfer(TransferError::OutputMissing { .. })
        ));
    }

    #[tokio::test]
    async fn cancellation_during_transfer_aborts() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(StubBackend {
            events: vec![
                downloading(10, 100, "f137.mp4"),
                downloading(20, 100, "f137.mp4"),
                downloading(30, 100, "f137.mp4"),
            ],
            ..StubBackend::producing(".mp4", "video:h264,audio:aac")
        });
        let pipeline = pipeline(dir.path(), backend, Arc::new(StubMediaTool::default()));

        // starting + first progress point, then the flag flips
        let mut reporter = RecordingReporter {
            cancel_after: Some(2),
            ..Default::default()
        };
        let err = pipeline
            .run(
                &FetchRequest::video("https://v.example.com/7", "mp4", "720p"),
                &titled("Cancelled"),
                JobId::new(),
                &mut reporter,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
        assert_eq!(reporter.snapshots.len(), 2);
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start_never_transfers() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(StubBackend::producing(".mp4", "video:h264,audio:aac"));
        let pipeline = pipeline(dir.path(), backend.clone(), Arc::new(StubMediaTool::default()));

        let mut reporter = RecordingReporter {
            cancel_after: Some(0),
            ..Default::default()
        };
        let err = pipeline
            .run(
                &FetchRequest::video("https://v.example.com/8", "mp4", "720p"),
                &titled("Early"),
                JobId::new(),
                &mut reporter,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn slideshow_is_zipped_and_scratch_removed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"one".to_vec(), "image/jpeg"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"two".to_vec(), "image/png"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let backend = Arc::new(StubBackend::default());
        let pipeline = pipeline(dir.path(), backend.clone(), Arc::new(StubMediaTool::default()));
        let metadata = MediaMetadata {
            title: Some("Trip".into()),
            image_urls: vec![format!("{}/1.jpg", server.uri()), format!("{}/2.png", server.uri())],
            ..Default::default()
        };

        let mut reporter = RecordingReporter::default();
        let result = pipeline
            .run(
                &FetchRequest::video("https://p.example.com/post/9", "mp4", "best"),
                &metadata,
                JobId::new(),
                &mut reporter,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(backend.calls(), 0);
        assert_eq!(result.file_path, dir.path().join("Trip_slideshow.zip"));
        assert_eq!(result.format, "zip");
        assert_eq!(files_in(dir.path()), vec!["Trip_slideshow.zip"]);
        assert_eq!(
            reporter.points(),
            vec![
                (Phase::Starting, 0.0),
                (Phase::DownloadingImages, 45.0),
                (Phase::DownloadingImages, 90.0),
                (Phase::Zipping, 90.0),
            ]
        );

        let archive =
            zip::ZipArchive::new(std::fs::File::open(&result.file_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
    }
}
