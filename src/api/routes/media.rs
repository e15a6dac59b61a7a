//! Metadata lookup handler.

use super::InfoRequest;
use crate::api::AppState;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};

/// POST /info - Resolve metadata for a URL
#[utoipa::path(
    post,
    path = "/api/v1/info",
    tag = "media",
    request_body = InfoRequest,
    responses(
        (status = 200, description = "Extracted metadata", body = crate::types::MediaMetadata),
        (status = 422, description = "No extraction strategy produced metadata", body = crate::error::ApiError)
    )
)]
pub async fn get_info(State(state): State<AppState>, Json(request): Json<InfoRequest>) -> Response {
    match state.fetcher.info(&request.url).await {
        Ok(metadata) => Json(metadata).into_response(),
        Err(e) => e.into_response(),
    }
}
