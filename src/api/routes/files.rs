//! Download-once artifact retrieval.

use crate::api::AppState;
use crate::error::Error;
use crate::types::JobId;
use crate::utils::{ARTIFACT_EXTENSIONS, file_name_str, mime_type_for, sanitize_filename};
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::path::{Path as FsPath, PathBuf};
use tokio_util::io::ReaderStream;

const GONE_MESSAGE: &str = "File no longer available. Please re-download.";

/// GET /files/:id - Stream a finished artifact once
///
/// The file is deleted after its body has been fully sent. Artifacts with a
/// history record are served under their sanitized title; otherwise the
/// download directory is searched for `{id}.{ext}`.
#[utoipa::path(
    get,
    path = "/api/v1/files/{id}",
    tag = "files",
    params(
        ("id" = String, Path, description = "Job or artifact ID")
    ),
    responses(
        (status = 200, description = "The artifact as an attachment", body = String, content_type = "application/octet-stream"),
        (status = 404, description = "Already served or never produced", body = crate::error::ApiError)
    )
)]
pub async fn get_file(State(state): State<AppState>, Path(id): Path<JobId>) -> Response {
    let Some((path, filename)) = locate(&state, id).await else {
        return Error::NotFound(GONE_MESSAGE.to_string()).into_response();
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Error::NotFound(GONE_MESSAGE.to_string()).into_response();
        }
        Err(e) => return Error::Io(e).into_response(),
    };
    let length = file.metadata().await.ok().map(|m| m.len());

    let mime = mime_type_for(&path);
    let cleanup_path = path.clone();
    let cleanup = futures::stream::once(async move {
        match tokio::fs::remove_file(&cleanup_path).await {
            Ok(()) => tracing::info!(path = %cleanup_path.display(), "deleted served file"),
            Err(e) => {
                tracing::debug!(path = %cleanup_path.display(), error = %e, "served file already gone")
            }
        }
        None::<std::io::Result<Bytes>>
    })
    .filter_map(futures::future::ready);

    let body = Body::from_stream(ReaderStream::new(file).chain(cleanup));

    let mut response = (
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&filename)),
        ],
        body,
    )
        .into_response();
    if let Some(length) = length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, length.into());
    }
    response
}

/// Resolve the artifact path and its download name
async fn locate(state: &AppState, id: JobId) -> Option<(PathBuf, String)> {
    match state.fetcher.db.get_history(id).await {
        Ok(Some(record)) if exists(&record.file_path).await => {
            let ext = record
                .file_path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_string)
                .unwrap_or_else(|| record.format.clone());
            let filename = if record.title.trim().is_empty() {
                file_name_str(&record.file_path)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{id}.{ext}"))
            } else {
                format!("{}.{ext}", sanitize_filename(&record.title))
            };
            return Some((record.file_path, filename));
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(job_id = %id, error = %e, "history lookup failed"),
    }

    let dir = state.config.download_dir();
    for ext in ARTIFACT_EXTENSIONS {
        let candidate = dir.join(format!("{id}.{ext}"));
        if exists(&candidate).await {
            return Some((candidate, format!("{id}.{ext}")));
        }
    }
    None
}

async fn exists(path: &FsPath) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}
