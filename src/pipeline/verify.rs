//! Output discovery, stream integrity verification and fallback merge

use crate::error::{Error, StreamIntegrityError};
use crate::media_tool::{MediaTool, StreamClass};
use crate::utils::{file_name_str, files_with_prefix};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

// Intermediate streams are named `{id}.f{N}.{ext}`; finished files `{id}.{ext}`.
fn dots_after_prefix(path: &Path, prefix: &str) -> usize {
    file_name_str(path)
        .and_then(|name| name.strip_prefix(prefix))
        .map(|rest| rest.matches('.').count())
        .unwrap_or(0)
}

fn is_partial(path: &Path) -> bool {
    file_name_str(path).is_some_and(|name| name.ends_with(".part"))
}

async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

/// Locate the artifact a transfer produced
///
/// Prefers `{prefix}.{expected_ext}`, then the largest finished file with the
/// prefix, then the largest file with the prefix at all. `.part` files never
/// count.
pub(crate) async fn find_output_file(dir: &Path, prefix: &str, expected_ext: &str) -> Option<PathBuf> {
    let expected = dir.join(format!("{prefix}.{expected_ext}"));
    if tokio::fs::metadata(&expected).await.is_ok_and(|m| m.is_file()) {
        return Some(expected);
    }

    let all: Vec<PathBuf> = files_with_prefix(dir, prefix)
        .await
        .into_iter()
        .filter(|p| !is_partial(p))
        .collect();
    let finished: Vec<PathBuf> = all
        .iter()
        .filter(|p| dots_after_prefix(p, prefix) <= 1)
        .cloned()
        .collect();
    let candidates = if finished.is_empty() { all } else { finished };

    let mut best: Option<(u64, PathBuf)> = None;
    for candidate in candidates {
        let size = file_size(&candidate).await;
        if best.as_ref().is_none_or(|(best_size, _)| size > *best_size) {
            best = Some((size, candidate));
        }
    }
    best.map(|(_, path)| path)
}

/// Separately downloaded component streams left behind by a transfer
pub(crate) async fn intermediate_files(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    files_with_prefix(dir, prefix)
        .await
        .into_iter()
        .filter(|p| !is_partial(p) && dots_after_prefix(p, prefix) > 1)
        .collect()
}

/// Check `path` carries both video and audio, repairing it from intermediates if not
///
/// Never fails: when the fallback merge cannot help, the original artifact is
/// returned and the problem is logged.
pub(crate) async fn ensure_complete_streams(
    tool: &dyn MediaTool,
    path: PathBuf,
    prefix: &str,
    format: &str,
) -> PathBuf {
    if !tool.capabilities().can_probe {
        debug!(tool = tool.name(), "media tool cannot probe, skipping stream verification");
        return path;
    }

    let report = match tool.probe_streams(&path).await {
        Ok(report) => report,
        Err(e) => {
            warn!(path = ?path, error = %e, "stream verification failed");
            Default::default()
        }
    };
    info!(
        path = ?path,
        has_video = report.has_video,
        video_codec = ?report.video_codec,
        has_audio = report.has_audio,
        audio_codec = ?report.audio_codec,
        "stream verification"
    );
    if report.is_complete() {
        return path;
    }

    let missing = StreamIntegrityError::MissingStreams {
        path: path.clone(),
        has_video: report.has_video,
        has_audio: report.has_audio,
    };
    warn!(error = %missing, "attempting fallback merge");

    let Some(dir) = path.parent() else {
        return path;
    };
    match fallback_merge(tool, dir, prefix, format).await {
        Ok(merged) => {
            match tool.probe_streams(&merged).await {
                Ok(report) if report.is_complete() => {}
                Ok(report) => error!(
                    path = ?merged,
                    has_video = report.has_video,
                    has_audio = report.has_audio,
                    "fallback merge still missing streams"
                ),
                Err(e) => warn!(path = ?merged, error = %e, "could not verify fallback merge"),
            }
            merged
        }
        Err(e) => {
            error!(path = ?path, error = %e, "fallback merge failed, serving file as-is");
            path
        }
    }
}

/// Combine separately downloaded video and audio intermediates into `{prefix}.{format}`
pub(crate) async fn fallback_merge(
    tool: &dyn MediaTool,
    dir: &Path,
    prefix: &str,
    format: &str,
) -> crate::Result<PathBuf> {
    let mut video: Option<PathBuf> = None;
    let mut audio: Option<PathBuf> = None;

    for candidate in intermediate_files(dir, prefix).await {
        let class = match tool.codec_types(&candidate).await {
            Ok(types) => StreamClass::from_codec_types(&types),
            Err(e) => {
                debug!(path = ?candidate, error = %e, "probe failed, classifying by extension");
                StreamClass::from_extension(&candidate)
            }
        };
        match class {
            StreamClass::Video if video.is_none() => video = Some(candidate),
            StreamClass::Audio if audio.is_none() => audio = Some(candidate),
            _ => {}
        }
    }

    let (video, audio) = match (video, audio) {
        (Some(video), Some(audio)) => (video, audio),
        (video, _) => {
            let missing = if video.is_none() { "video" } else { "audio" };
            return Err(StreamIntegrityError::IntermediatesMissing {
                job_id: prefix.to_string(),
                missing: missing.to_string(),
            }
            .into());
        }
    };

    let merged = dir.join(format!("{prefix}.{format}"));
    info!(video = ?video, audio = ?audio, output = ?merged, "fallback merge");
    tool.merge(&video, &audio, &merged, format).await?;

    if file_size(&merged).await == 0 {
        return Err(Error::StreamIntegrity(StreamIntegrityError::EmptyOutput {
            path: merged,
        }));
    }
    info!(output = ?merged, "fallback merge succeeded");
    Ok(merged)
}
