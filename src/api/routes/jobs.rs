//! Job handlers: submissions, cancellation, snapshots and progress streams.

use super::{
    AudioDownloadRequest, BatchDownloadRequest, DownloadRequest, JobCancelled, JobStarted,
};
use crate::api::AppState;
use crate::error::Error;
use crate::progress_store::{JobState, ProgressStore};
use crate::types::{BatchRequest, FetchRequest, JobId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use futures::stream::{self, Stream};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Default container for audio-only requests
const DEFAULT_AUDIO_FORMAT: &str = "mp3";

fn started(id: JobId, count: Option<usize>) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(JobStarted {
            job_id: id,
            status: "started".to_string(),
            count,
        }),
    )
        .into_response()
}

/// POST /downloads - Start fetching one source
#[utoipa::path(
    post,
    path = "/api/v1/downloads",
    tag = "jobs",
    request_body = DownloadRequest,
    responses(
        (status = 202, description = "Job started", body = JobStarted),
        (status = 400, description = "Empty URL", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn start_download(
    State(state): State<AppState>,
    Json(body): Json<DownloadRequest>,
) -> Response {
    let download = &state.config.download;
    let mut request = FetchRequest::video(
        body.url,
        body.format.unwrap_or_else(|| download.default_format.clone()),
        body.quality.unwrap_or_else(|| download.default_quality.clone()),
    );
    request.user_id = body.user_id;

    match state.fetcher.submit(request) {
        Ok(id) => started(id, None),
        Err(e) => e.into_response(),
    }
}

/// POST /downloads/audio - Start fetching the audio track of one source
#[utoipa::path(
    post,
    path = "/api/v1/downloads/audio",
    tag = "jobs",
    request_body = AudioDownloadRequest,
    responses(
        (status = 202, description = "Job started", body = JobStarted),
        (status = 400, description = "Empty URL", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn start_audio_download(
    State(state): State<AppState>,
    Json(body): Json<AudioDownloadRequest>,
) -> Response {
    let mut request = FetchRequest::audio(
        body.url,
        body.format.unwrap_or_else(|| DEFAULT_AUDIO_FORMAT.to_string()),
    );
    request.user_id = body.user_id;

    match state.fetcher.submit(request) {
        Ok(id) => started(id, None),
        Err(e) => e.into_response(),
    }
}

/// POST /batches - Start fetching a list of sources in order
#[utoipa::path(
    post,
    path = "/api/v1/batches",
    tag = "jobs",
    request_body = BatchDownloadRequest,
    responses(
        (status = 202, description = "Batch started", body = JobStarted),
        (status = 400, description = "Empty or oversized list", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn start_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchDownloadRequest>,
) -> Response {
    let download = &state.config.download;
    let count = body.urls.len();
    let request = BatchRequest {
        urls: body.urls,
        format: body.format.unwrap_or_else(|| download.default_format.clone()),
        quality: body.quality.unwrap_or_else(|| download.default_quality.clone()),
        user_id: body.user_id,
    };

    match state.fetcher.submit_batch(request) {
        Ok(id) => started(id, Some(count)),
        Err(e) => e.into_response(),
    }
}

/// POST /jobs/:id/cancel - Request cancellation
///
/// Idempotent. Unknown ids are accepted so a cancel that races the job's
/// creation still takes effect.
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{id}/cancel",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Cancellation requested", body = JobCancelled)
    )
)]
pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<JobId>) -> Response {
    state.fetcher.cancel(id);
    Json(JobCancelled {
        status: "cancelled".to_string(),
        job_id: id,
    })
    .into_response()
}

/// GET /jobs/:id - Current progress snapshot
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Progress snapshot", body = JobState),
        (status = 404, description = "Unknown or expired job", body = crate::error::ApiError)
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<JobId>) -> Response {
    match state.fetcher.progress(id) {
        Some(job) => Json(job).into_response(),
        None => Error::NotFound(format!("job {id}")).into_response(),
    }
}

/// GET /jobs/:id/events - Server-sent progress stream for one job
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/events",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "SSE stream of `progress` events, ending on a terminal state", body = String, content_type = "text/event-stream")
    )
)]
pub async fn job_events(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    progress_stream(state, id)
}

/// GET /batches/:id/events - Server-sent progress stream for a batch
#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}/events",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Batch job ID")
    ),
    responses(
        (status = 200, description = "SSE stream of `progress` events with batch detail, ending on a terminal state", body = String, content_type = "text/event-stream")
    )
)]
pub async fn batch_events(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    progress_stream(state, id)
}

struct Poller {
    store: Arc<ProgressStore>,
    id: JobId,
    interval: Interval,
    finished: bool,
}

/// Poll the store on the configured interval, emitting one `progress` event
/// per tick and ending after the first terminal snapshot
fn progress_stream(
    state: AppState,
    id: JobId,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let mut interval = tokio::time::interval(state.config.progress.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let poller = Poller {
        store: state.fetcher.store().clone(),
        id,
        interval,
        finished: false,
    };

    let stream = stream::unfold(poller, |mut poller| async move {
        if poller.finished {
            return None;
        }
        poller.interval.tick().await;

        let event = match poller.store.get(poller.id) {
            Some(job) => {
                poller.finished = job.status.is_terminal();
                progress_event(&job)
            }
            None => {
                poller.finished = true;
                SseEvent::default().event("error").data(
                    json!({"error": {"code": "not_found", "message": format!("job {} not found", poller.id)}})
                        .to_string(),
                )
            }
        };
        Some((Ok(event), poller))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn progress_event(job: &JobState) -> SseEvent {
    match serde_json::to_string(job) {
        Ok(data) => SseEvent::default().event("progress").data(data),
        Err(e) => {
            tracing::warn!(job_id = %job.id, error = %e, "failed to serialize progress snapshot");
            SseEvent::default().event("progress").data("{}")
        }
    }
}
