//! Leftover removal and title-based renaming of the final artifact

use crate::utils::{files_with_prefix, rename_unique, sanitize_filename};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Delete every file in `dir` named with `prefix` except `keep`
///
/// Returns the number of files removed. Removal failures are logged and
/// skipped.
pub(crate) async fn cleanup_intermediates(dir: &Path, prefix: &str, keep: &Path) -> usize {
    let mut removed = 0;
    for path in files_with_prefix(dir, prefix).await {
        if path == keep {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = ?path, "removed intermediate file");
                removed += 1;
            }
            Err(e) => warn!(path = ?path, error = %e, "failed to remove intermediate file"),
        }
    }
    removed
}

/// Rename `path` to `{title}{suffix}.{ext}` in the same directory
///
/// Name clashes get a ` (N)` counter, claimed atomically so jobs finishing
/// with the same title keep separate files. If the rename fails the artifact
/// keeps its id-based name.
pub(crate) async fn rename_to_title(path: PathBuf, title: &str, suffix: &str) -> PathBuf {
    let Some(dir) = path.parent() else {
        return path;
    };
    let mut name = format!("{}{suffix}", sanitize_filename(title));
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }

    let desired = dir.join(name);
    if desired == path {
        return path;
    }
    match rename_unique(&path, &desired).await {
        Ok(target) => {
            info!(from = ?path, to = ?target, "renamed artifact");
            target
        }
        Err(e) => {
            warn!(path = ?path, error = %e, "rename failed, keeping id name");
            path
        }
    }
}
