//! REST API server module
//!
//! Exposes job submission, progress snapshots and streams, download-once
//! file retrieval and metadata lookup over HTTP, with an OpenAPI 3.1 document.

use crate::{Config, MediaFetcher, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// All routes are nested under `/api/v1`.
///
/// ## Jobs
/// - `POST /downloads` - Fetch one source
/// - `POST /downloads/audio` - Fetch the audio track of one source
/// - `POST /batches` - Fetch a list of sources in order
/// - `GET /jobs/:id` - Progress snapshot
/// - `POST /jobs/:id/cancel` - Request cancellation
/// - `GET /jobs/:id/events` - Server-sent progress stream
/// - `GET /batches/:id/events` - Server-sent batch progress stream
///
/// ## Media
/// - `POST /info` - Resolve metadata for a URL
///
/// ## Files
/// - `GET /files/:id` - Download a finished artifact (once)
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(fetcher: Arc<MediaFetcher>, config: Arc<Config>) -> Router {
    let state = AppState::new(fetcher, config.clone());

    let v1 = Router::new()
        // Jobs
        .route("/downloads", post(routes::start_download))
        .route("/downloads/audio", post(routes::start_audio_download))
        .route("/batches", post(routes::start_batch))
        .route("/batches/:id/events", get(routes::batch_events))
        .route("/jobs/:id", get(routes::get_job))
        .route("/jobs/:id/cancel", post(routes::cancel_job))
        .route("/jobs/:id/events", get(routes::job_events))
        // Media
        .route("/info", post(routes::get_info))
        // Files
        .route("/files/:id", get(routes::get_file))
        // System
        .route("/health", get(routes::health_check));

    // With Swagger UI enabled, SwaggerUi itself serves /api/v1/openapi.json
    let router = if config.server.api.swagger_ui {
        Router::new()
            .nest("/api/v1", v1)
            .merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        let v1 = v1.route("/openapi.json", get(routes::openapi_spec));
        Router::new().nest("/api/v1", v1)
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer from the configured origins ("*" or an empty list allows any)
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the listener fails or the task is aborted.
///
/// # Example
///
/// ```no_run
/// use media_fetch::{Config, MediaFetcher};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let fetcher = Arc::new(MediaFetcher::new((*config).clone()).await?);
///
/// media_fetch::api::start_api_server(fetcher, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(fetcher: Arc<MediaFetcher>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.server.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(fetcher, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().map_err(crate::error::Error::Io)?,
        "API server listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
