//! Sequential image fetching for slideshow posts

use super::traits::ProgressSink;
use crate::error::{Error, TransferError};
use crate::types::ProgressEvent;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_EXTENSION: &str = "webp";
const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "heic"];

/// Downloads image URLs one after another into a directory
#[derive(Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
}

impl ImageFetcher {
    /// Create a fetcher with a per-request timeout
    pub fn new(timeout: Duration) -> crate::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// Fetch every URL into `dir` as `slide_NN.ext`
    ///
    /// Emits `ItemProgress { index, total }` after each attempt. Images that
    /// fail are logged and skipped; an empty result is
    /// [`TransferError::NoItems`].
    pub async fn fetch_all(
        &self,
        urls: &[String],
        dir: &Path,
        sink: &mut ProgressSink<'_>,
        cancel: &CancellationToken,
    ) -> crate::Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dir).await?;
        let total = urls.len();
        let mut saved = Vec::with_capacity(total);

        for (index, url) in urls.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match self.fetch_one(url, dir, index + 1).await {
                Ok(path) => saved.push(path),
                Err(e) => {
                    tracing::warn!(url = %url, index, error = %e, "skipping image");
                }
            }

            if sink(ProgressEvent::ItemProgress { index, total }).is_break() {
                return Err(Error::Cancelled);
            }
        }

        if saved.is_empty() {
            return Err(TransferError::NoItems {
                reason: format!("none of the {} images could be downloaded", total),
            }
            .into());
        }
        Ok(saved)
    }

    async fn fetch_one(&self, url: &str, dir: &Path, number: usize) -> crate::Result<PathBuf> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        let ext = image_extension(content_type.as_deref(), url);
        let path = dir.join(format!("slide_{:02}.{}", number, ext));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

/// Pick a file extension from the Content-Type, then the URL, then `webp`
pub(crate) fn image_extension(content_type: Option<&str>, url: &str) -> &'static str {
    let from_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .and_then(|ct| match ct.as_str() {
            "image/jpeg" | "image/jpg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/webp" => Some("webp"),
            "image/gif" => Some("gif"),
            "image/heic" => Some("heic"),
            _ => None,
        });
    if let Some(ext) = from_type {
        return ext;
    }

    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let url_ext = Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    url_ext
        .and_then(|ext| KNOWN_EXTENSIONS.iter().find(|k| **k == ext).copied())
        .map(|ext| if ext == "jpeg" { "jpg" } else { ext })
        .unwrap_or(DEFAULT_EXTENSION)
}
