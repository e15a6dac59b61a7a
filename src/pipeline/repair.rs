//! Codec/container compatibility repair

use crate::error::Error;
use crate::media_tool::MediaTool;
use std::path::{Path, PathBuf};

/// Video codecs mp4 players handle everywhere; an empty answer means "unknown, leave it"
const MP4_COMPATIBLE: &[&str] = &["h264", "avc1", ""];

/// Make sure an mp4 artifact carries H.264 video, re-encoding in place if not
///
/// Any failure leaves the original untouched; the skipped repair is logged.
pub(crate) async fn ensure_mp4_h264(tool: &dyn MediaTool, path: &Path) {
    if !tool.capabilities().can_probe {
        return;
    }

    let codec = match tool.video_codec(path).await {
        Ok(codec) => codec.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "codec check failed, keeping file");
            return;
        }
    };
    tracing::info!(path = ?path, codec = %codec, "mp4 video codec");
    if MP4_COMPATIBLE.contains(&codec.as_str()) {
        return;
    }

    if let Err(e) = reencode_in_place(tool, path, &codec).await {
        tracing::warn!(error = %e, "keeping original artifact");
    }
}

async fn reencode_in_place(tool: &dyn MediaTool, path: &Path, codec: &str) -> crate::Result<()> {
    let fixed = fixed_path(path);
    tracing::info!(path = ?path, from = %codec, "re-encoding to H.264");

    let skipped = |reason: String| Error::RepairSkipped {
        path: path.to_path_buf(),
        reason,
    };

    if let Err(e) = tool.reencode_h264(path, &fixed).await {
        remove_quietly(&fixed).await;
        return Err(skipped(e.to_string()));
    }

    let size = tokio::fs::metadata(&fixed).await.map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        remove_quietly(&fixed).await;
        return Err(skipped("re-encode produced an empty file".into()));
    }

    // Rename over the original; on failure the original is still intact
    if let Err(e) = tokio::fs::rename(&fixed, path).await {
        remove_quietly(&fixed).await;
        return Err(skipped(format!("could not replace original: {e}")));
    }
    tracing::info!(path = ?path, "re-encode complete");
    Ok(())
}

fn fixed_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}_fixed.mp4"))
}

async fn remove_quietly(path: &Path) {
    if tokio::fs::metadata(path).await.is_ok()
        && let Err(e) = tokio::fs::remove_file(path).await
    {
        tracing::warn!(path = ?path, error = %e, "failed to remove partial re-encode");
    }
}
