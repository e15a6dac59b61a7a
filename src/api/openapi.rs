//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the media-fetch REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the media-fetch REST API
///
/// The document is served at:
/// - `/api/v1/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-fetch REST API",
        version = "0.1.0",
        description = "Metadata extraction, supervised media retrieval jobs and progress reporting",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790/api/v1", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::start_download,
        crate::api::routes::start_audio_download,
        crate::api::routes::start_batch,
        crate::api::routes::cancel_job,
        crate::api::routes::get_job,
        crate::api::routes::job_events,
        crate::api::routes::batch_events,

        // Media
        crate::api::routes::get_info,

        // Files
        crate::api::routes::get_file,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobId,
        crate::types::JobKind,
        crate::types::JobStatus,
        crate::types::Phase,
        crate::types::MediaKind,
        crate::types::FetchRequest,
        crate::types::BatchRequest,
        crate::types::FetchResult,
        crate::types::FailedItem,
        crate::types::CompletedItem,
        crate::types::HistoryRecord,
        crate::types::MediaMetadata,
        crate::types::FormatInfo,

        // Progress snapshots
        crate::progress_store::JobState,
        crate::progress_store::BatchState,

        // Config types from config.rs
        crate::config::Config,
        crate::config::DownloadConfig,
        crate::config::ToolsConfig,
        crate::config::ProgressConfig,
        crate::config::Band,
        crate::config::PhaseBands,
        crate::config::PhaseConfig,
        crate::config::PersistenceConfig,
        crate::config::ExtractionConfig,
        crate::config::ServerIntegrationConfig,
        crate::config::ApiConfig,

        // API request/response types
        crate::api::routes::InfoRequest,
        crate::api::routes::DownloadRequest,
        crate::api::routes::AudioDownloadRequest,
        crate::api::routes::BatchDownloadRequest,
        crate::api::routes::JobStarted,
        crate::api::routes::JobCancelled,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Jobs - Submit, cancel and follow single and batch retrievals"),
        (name = "media", description = "Media - Resolve metadata without fetching"),
        (name = "files", description = "Files - Download-once retrieval of finished artifacts"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec"),
    )
)]
pub struct ApiDoc;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let spec = ApiDoc::openapi();
        let paths: Vec<&str> = spec.paths.paths.keys().map(String::as_str).collect();

        for expected in [
            "/api/v1/downloads",
            "/api/v1/downloads/audio",
            "/api/v1/batches",
            "/api/v1/batches/{id}/events",
            "/api/v1/jobs/{id}",
            "/api/v1/jobs/{id}/cancel",
            "/api/v1/jobs/{id}/events",
            "/api/v1/info",
            "/api/v1/files/{id}",
            "/api/v1/health",
        ] {
            assert!(paths.contains(&expected), "missing path {expected}");
        }
    }

    #[test]
    fn document_has_schemas_and_tags() {
        let spec = ApiDoc::openapi();

        let components = spec.components.expect("components");
        assert!(components.schemas.contains_key("JobState"));
        assert!(components.schemas.contains_key("ApiError"));

        let tags = spec.tags.expect("tags");
        let tag_names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tag_names, ["jobs", "media", "files", "system"]);
    }

    #[test]
    fn document_serializes_as_openapi_3() {
        let spec = ApiDoc::openapi();

        let json = serde_json::to_value(&spec).expect("Should serialize to JSON");
        assert_eq!(spec.info.title, "media-fetch REST API");
        assert!(json["openapi"].as_str().unwrap().starts_with("3."));
    }
}
