//! Utility functions for file naming and path manipulation

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Longest title (in characters) kept when building a file name
const MAX_TITLE_CHARS: usize = 200;

/// Characters that are not allowed in artifact file names
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Get a unique path for a file, appending ` (N)` until nothing exists there
///
/// # Arguments
///
/// * `path` - The desired file path
///
/// # Returns
///
/// Returns `path` unchanged if it is free, otherwise the first free
/// `stem (N).ext` sibling.
///
/// The answer can be stale by the time the caller uses it. Use
/// [`rename_unique`] when another task may be claiming names in the same
/// directory.
///
/// # Examples
///
/// ```
/// use media_fetch::utils::get_unique_path;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/some clip.mp4");
/// let unique = get_unique_path(path).unwrap();
/// // If /tmp/some clip.mp4 exists, returns /tmp/some clip (1).mp4
/// ```
pub fn get_unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    numbered_siblings(path, MAX_RENAME_ATTEMPTS)?
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| exhausted(path, MAX_RENAME_ATTEMPTS))
}

/// Move `from` to `desired`, or to the first free `stem (N).ext` sibling
///
/// Each name is claimed with an exclusive create before the rename lands on
/// it, so concurrent callers asking for the same name never overwrite each
/// other's files.
pub async fn rename_unique(from: &Path, desired: &Path) -> Result<PathBuf> {
    rename_unique_within(from, desired, MAX_RENAME_ATTEMPTS).await
}

async fn rename_unique_within(from: &Path, desired: &Path, max_attempts: u32) -> Result<PathBuf> {
    let candidates =
        std::iter::once(desired.to_path_buf()).chain(numbered_siblings(desired, max_attempts)?);

    for candidate in candidates {
        let claimed = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await;
        match claimed {
            Ok(placeholder) => drop(placeholder),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = tokio::fs::rename(from, &candidate).await {
            let _ = tokio::fs::remove_file(&candidate).await;
            return Err(e.into());
        }
        return Ok(candidate);
    }

    Err(exhausted(desired, max_attempts))
}

/// `stem (1).ext` through `stem (max).ext` next to `path`
fn numbered_siblings(path: &Path, max_attempts: u32) -> Result<impl Iterator<Item = PathBuf>> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("cannot extract file stem from {}", path.display())))?
        .to_string();
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_string);
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidInput(format!("{} has no parent directory", path.display())))?
        .to_path_buf();

    Ok((1..=max_attempts).map(move |i| {
        let new_name = match &extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        parent.join(new_name)
    }))
}

fn exhausted(path: &Path, max_attempts: u32) -> Error {
    Error::Other(format!(
        "could not find unique filename for {} after {} attempts",
        path.display(),
        max_attempts
    ))
}

/// Turn a media title into a safe file name stem
///
/// Removes `<>:"/\|?*`, collapses whitespace runs to one space, trims, and
/// truncates to 200 characters. Empty results become `"untitled"`.
///
/// # Examples
///
/// ```
/// use media_fetch::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("What?  Really: \"yes\""), "What Really yes");
/// assert_eq!(sanitize_filename("???"), "untitled");
/// ```
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let stripped: String = name.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    let truncated: String = if collapsed.chars().count() > MAX_TITLE_CHARS {
        collapsed
            .chars()
            .take(MAX_TITLE_CHARS)
            .collect::<String>()
            .trim()
            .to_string()
    } else {
        collapsed
    };

    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated
    }
}

/// MIME type for an artifact, from its extension
#[must_use]
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("zip") => "application/zip",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Extensions searched when an artifact has no history record
pub const ARTIFACT_EXTENSIONS: &[&str] = &[
    "mp4", "webm", "mkv", "mp3", "m4a", "zip", "jpg", "jpeg", "png", "webp",
];

/// File name as UTF-8, if it has one
pub(crate) fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Regular files directly inside `dir` whose name starts with `prefix`
///
/// Other jobs write into the same directory concurrently, so entries that
/// vanish between listing and inspection are skipped. A missing directory
/// yields an empty list.
pub(crate) async fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(?dir, error = %e, "cannot list directory");
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let matches = file_name_str(&path).is_some_and(|name| name.starts_with(prefix));
        if !matches {
            continue;
        }
        if entry.file_type().await.is_ok_and(|t| t.is_file()) {
            found.push(path);
        }
    }
    found.sort();
    found
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_get_unique_path_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mp4");

        assert_eq!(get_unique_path(&path).unwrap(), path);
    }

    #[test]
    fn test_get_unique_path_appends_counter() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mp4");
        fs::write(&path, "original").unwrap();

        let unique = get_unique_path(&path).unwrap();
        assert_eq!(unique, temp_dir.path().join("clip (1).mp4"));

        fs::write(&unique, "first rename").unwrap();
        let unique2 = get_unique_path(&path).unwrap();
        assert_eq!(unique2, temp_dir.path().join("clip (2).mp4"));
    }

    #[test]
    fn test_get_unique_path_without_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip");
        fs::write(&path, "original").unwrap();

        assert_eq!(
            get_unique_path(&path).unwrap(),
            temp_dir.path().join("clip (1)")
        );
    }

    #[test]
    fn test_sanitize_filename_strips_forbidden_characters() {
        assert_eq!(
            sanitize_filename(r#"a<b>c:d"e/f\g|h?i*j"#),
            "abcdefghij"
        );
    }

    #[test]
    fn test_sanitize_filename_collapses_whitespace() {
        assert_eq!(sanitize_filename("  my \t\n  clip  "), "my clip");
    }

    #[test]
    fn test_sanitize_filename_truncates_on_char_boundary() {
        let long = "é".repeat(250);
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.chars().count(), 200);
    }

    #[test]
    fn test_sanitize_filename_empty_becomes_untitled() {
        assert_eq!(sanitize_filename(""), "untitled");
        assert_eq!(sanitize_filename(" ?* "), "untitled");
    }

    #[test]
    fn test_mime_type_for_known_and_unknown_extensions() {
        assert_eq!(mime_type_for(Path::new("a.MP4")), "video/mp4");
        assert_eq!(mime_type_for(Path::new("a.mkv")), "video/x-matroska");
        assert_eq!(mime_type_for(Path::new("a.m4a")), "audio/mp4");
        assert_eq!(mime_type_for(Path::new("a.zip")), "application/zip");
        assert_eq!(mime_type_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("a.bin")), "application/octet-stream");
        assert_eq!(mime_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_files_with_prefix_skips_directories_and_other_jobs() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("job-a.mp4"), "x").unwrap();
        fs::write(temp_dir.path().join("job-a.f140.m4a"), "x").unwrap();
        fs::write(temp_dir.path().join("job-b.mp4"), "x").unwrap();
        fs::create_dir(temp_dir.path().join("job-a_dir")).unwrap();

        let found = files_with_prefix(temp_dir.path(), "job-a").await;

        assert_eq!(
            found,
            vec![
                temp_dir.path().join("job-a.f140.m4a"),
                temp_dir.path().join("job-a.mp4"),
            ]
        );
    }

    #[tokio::test]
    async fn test_files_with_prefix_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(files_with_prefix(&temp_dir.path().join("gone"), "x").await.is_empty());
    }

    #[test]
    fn test_get_unique_path_skips_taken_counters() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip.mp4");
        fs::write(&path, "original").unwrap();
        fs::write(temp_dir.path().join("clip (1).mp4"), "one").unwrap();
        fs::write(temp_dir.path().join("clip (3).mp4"), "three").unwrap();

        assert_eq!(
            get_unique_path(&path).unwrap(),
            temp_dir.path().join("clip (2).mp4")
        );
    }

    #[test]
    fn test_get_unique_path_without_file_stem_is_invalid() {
        // The root always exists and has no file stem
        let result = get_unique_path(Path::new("/"));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_numbered_siblings_empty_path_is_invalid() {
        assert!(matches!(
            numbered_siblings(Path::new(""), 3),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_unique_takes_desired_name_when_free() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("job.mp4");
        fs::write(&from, "mine").unwrap();
        let desired = temp_dir.path().join("clip.mp4");

        let renamed = rename_unique(&from, &desired).await.unwrap();

        assert_eq!(renamed, desired);
        assert_eq!(fs::read_to_string(&desired).unwrap(), "mine");
        assert!(!from.exists());
    }

    #[tokio::test]
    async fn test_rename_unique_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let desired = temp_dir.path().join("clip.mp4");
        fs::write(&desired, "someone else's").unwrap();
        let from = temp_dir.path().join("job.mp4");
        fs::write(&from, "mine").unwrap();

        let renamed = rename_unique(&from, &desired).await.unwrap();

        assert_eq!(renamed, temp_dir.path().join("clip (1).mp4"));
        assert_eq!(fs::read_to_string(&desired).unwrap(), "someone else's");
        assert_eq!(fs::read_to_string(&renamed).unwrap(), "mine");
    }

    #[tokio::test]
    async fn test_rename_unique_gives_up_after_max_attempts() {
        let temp_dir = TempDir::new().unwrap();
        let desired = temp_dir.path().join("clip.mp4");
        fs::write(&desired, "0").unwrap();
        fs::write(temp_dir.path().join("clip (1).mp4"), "1").unwrap();
        fs::write(temp_dir.path().join("clip (2).mp4"), "2").unwrap();
        let from = temp_dir.path().join("job.mp4");
        fs::write(&from, "mine").unwrap();

        let result = rename_unique_within(&from, &desired, 2).await;

        assert!(matches!(result, Err(Error::Other(_))));
        assert_eq!(fs::read_to_string(&from).unwrap(), "mine");
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 4);
    }

    #[tokio::test]
    async fn test_rename_unique_missing_source_releases_claimed_name() {
        let temp_dir = TempDir::new().unwrap();
        let desired = temp_dir.path().join("clip.mp4");

        let result = rename_unique(&temp_dir.path().join("gone.mp4"), &desired).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(!desired.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_rename_unique_concurrent_callers_get_distinct_names() {
        let temp_dir = TempDir::new().unwrap();
        let desired = temp_dir.path().join("clip.mp4");
        let mut tasks = Vec::new();
        for i in 0..32 {
            let from = temp_dir.path().join(format!("job-{i}.mp4"));
            fs::write(&from, i.to_string()).unwrap();
            let desired = desired.clone();
            tasks.push(tokio::spawn(async move { rename_unique(&from, &desired).await }));
        }

        let mut names = Vec::new();
        for task in tasks {
            names.push(task.await.unwrap().unwrap());
        }
        names.sort();
        names.dedup();

        assert_eq!(names.len(), 32);
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 32);
    }
}
