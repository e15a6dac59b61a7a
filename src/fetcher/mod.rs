//! Job submission and supervision
//!
//! [`MediaFetcher`] is the entry point of the library. Every submission gets
//! a fresh [`JobId`], an initial `waiting` record in the [`ProgressStore`], and
//! two spawned tasks: the job body and a supervisor awaiting its handle. The
//! caller never waits for completion; progress is read back from the store.
//!
//! The supervisor guarantees a terminal state. A body that panics is turned
//! into an `error` write, and every body that ends in an error is followed by
//! an orphan scan over files modified since the job started.

mod runner;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub(crate) use runner::JobRunner;

use crate::batch::BatchCoordinator;
use crate::cleanup::CleanupService;
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::extraction::{
    EmbeddedJsonStrategy, ExtractionResolver, ExtractionStrategy, OEmbedStrategy, YtDlpStrategy,
};
use crate::media_tool::{FfmpegCli, MediaTool, NoOpMediaTool};
use crate::pipeline::Pipeline;
use crate::progress_store::{JobState, JobUpdate, ProgressStore};
use crate::transfer::{ImageFetcher, TransferBackend, YtDlpBackend};
use crate::types::{BatchRequest, FetchRequest, JobId, JobKind, MediaMetadata};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for running jobs
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request timeout for slideshow image fetches
const IMAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Running jobs and the switch that stops new ones
#[derive(Clone, Debug, Default)]
pub(crate) struct ActiveJobs {
    /// Job ids mapped to the token handed to their body
    pub(crate) tokens: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
    /// Set during shutdown; submissions are rejected afterwards
    pub(crate) shutting_down: Arc<AtomicBool>,
    /// Parent of every job token
    pub(crate) shutdown: CancellationToken,
}

impl ActiveJobs {
    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ids(&self) -> Vec<JobId> {
        self.lock().keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Main fetcher instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone, Debug)]
pub struct MediaFetcher {
    /// History database
    ///
    /// Public so embedding applications can list or inspect finished artifacts.
    pub db: Arc<Database>,
    pub(crate) config: Arc<Config>,
    pub(crate) store: Arc<ProgressStore>,
    pub(crate) resolver: Arc<ExtractionResolver>,
    pub(crate) runner: Arc<JobRunner>,
    pub(crate) batches: BatchCoordinator,
    pub(crate) active: ActiveJobs,
}

impl MediaFetcher {
    /// Create a fetcher from configuration
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Creates the download directory
    /// - Opens/creates the SQLite history database and runs migrations
    /// - Locates yt-dlp, ffmpeg and ffprobe
    ///
    /// A missing ffmpeg disables stream verification and repair; a missing
    /// yt-dlp is an error because nothing could be fetched.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.download_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download_dir().display(),
                        e
                    ),
                ))
            })?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);

        let backend = YtDlpBackend::from_config(&config.tools).ok_or_else(|| {
            Error::ExternalTool(
                "yt-dlp not found (set tools.ytdlp_path or install it in PATH)".into(),
            )
        })?;

        let media_tool: Arc<dyn MediaTool> = match FfmpegCli::from_config(&config.tools) {
            Some(cli) => Arc::new(
                cli.with_timeouts(config.tools.probe_timeout, config.tools.merge_timeout),
            ),
            None => {
                tracing::warn!("ffmpeg/ffprobe not found, stream verification disabled");
                Arc::new(NoOpMediaTool)
            }
        };

        let mut strategies: Vec<Arc<dyn ExtractionStrategy>> = Vec::new();
        if let Some(endpoint) = &config.extraction.oembed_endpoint {
            strategies.push(Arc::new(OEmbedStrategy::new(endpoint.clone())?));
        }
        strategies.push(Arc::new(YtDlpStrategy::new(
            backend.binary_path().to_path_buf(),
        )));
        if config.extraction.embedded_json {
            strategies.push(Arc::new(EmbeddedJsonStrategy::new()?));
        }

        tracing::info!(
            backend = backend.name(),
            media_tool = media_tool.name(),
            can_probe = media_tool.capabilities().can_probe,
            strategies = strategies.len(),
            "media fetcher initialized"
        );

        Self::with_components(config, db, Arc::new(backend), media_tool, strategies)
    }

    /// Create a fetcher from explicitly constructed collaborators
    ///
    /// Used for embedding with custom backends and in tests.
    pub fn with_components(
        config: Config,
        db: Arc<Database>,
        backend: Arc<dyn TransferBackend>,
        media_tool: Arc<dyn MediaTool>,
        strategies: Vec<Arc<dyn ExtractionStrategy>>,
    ) -> Result<Self> {
        let store = Arc::new(ProgressStore::new(config.progress.store_ttl));
        let resolver = Arc::new(ExtractionResolver::new(
            strategies,
            config.progress.extraction_cache_ttl,
        ));
        let pipeline = Arc::new(Pipeline::new(
            backend,
            media_tool,
            ImageFetcher::new(IMAGE_TIMEOUT)?,
            config.phases.clone(),
            config.download_dir().clone(),
        ));
        let cleanup = CleanupService::new(config.download_dir().clone(), db.clone());
        let runner = Arc::new(JobRunner {
            store: store.clone(),
            resolver: resolver.clone(),
            pipeline,
            db: db.clone(),
            cleanup,
            history_keep: config.download.history_keep,
        });

        Ok(Self {
            db,
            config: Arc::new(config),
            store,
            resolver,
            batches: BatchCoordinator::new(runner.clone()),
            runner,
            active: ActiveJobs::default(),
        })
    }

    /// Resolve metadata for a URL (or share text) without fetching anything
    pub async fn info(&self, url: &str) -> Result<MediaMetadata> {
        self.resolver.resolve(url).await
    }

    /// Submit a single source; returns immediately with the job id
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: FetchRequest) -> Result<JobId> {
        self.ensure_accepting()?;
        if request.url.trim().is_empty() {
            return Err(Error::InvalidInput("url must not be empty".into()));
        }

        let id = JobId::new();
        self.store.update(id, JobUpdate::new().kind(JobKind::Single));
        tracing::info!(job_id = %id, url = %request.url, "job submitted");

        let runner = self.runner.clone();
        self.spawn_supervised(id, move |cancel| async move {
            runner.run_single(id, request, cancel).await
        });
        Ok(id)
    }

    /// Submit a list of sources processed sequentially under one job id
    ///
    /// Empty lists and lists longer than `download.max_batch_size` are
    /// rejected before anything is spawned.
    pub fn submit_batch(&self, request: BatchRequest) -> Result<JobId> {
        self.ensure_accepting()?;
        if request.urls.is_empty() {
            return Err(Error::InvalidInput("batch must contain at least one url".into()));
        }
        let max = self.config.download.max_batch_size;
        if request.urls.len() > max {
            return Err(Error::InvalidInput(format!(
                "batch of {} urls exceeds the limit of {}",
                request.urls.len(),
                max
            )));
        }

        let id = JobId::new();
        self.store.update(id, JobUpdate::new().kind(JobKind::Batch));
        tracing::info!(job_id = %id, count = request.urls.len(), "batch submitted");

        let batches = self.batches.clone();
        self.spawn_supervised(id, move |cancel| async move {
            batches.run(id, request, cancel).await
        });
        Ok(id)
    }

    /// Request cancellation of a job
    ///
    /// Idempotent and valid for ids that have not started (or do not exist);
    /// the job observes it at its next progress callback.
    pub fn cancel(&self, id: JobId) {
        tracing::info!(job_id = %id, "cancellation requested");
        self.store.cancel(id);
    }

    /// Current snapshot of a job, `None` once evicted or if unknown
    pub fn progress(&self, id: JobId) -> Option<JobState> {
        self.store.get(id)
    }

    /// The progress store every job writes to
    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    /// Configuration the fetcher was built with
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Number of jobs whose task is still running
    pub fn active_jobs(&self) -> usize {
        self.active.len()
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.active.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }

    /// Spawn `body` for job `id` under a supervisor task
    fn spawn_supervised<F, Fut>(&self, id: JobId, body: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let started = SystemTime::now();
        let token = self.active.shutdown.child_token();
        self.active.lock().insert(id, token.clone());

        let handle = tokio::spawn(body(token));

        let store = self.store.clone();
        let cleanup = self.runner.cleanup.clone();
        let active = self.active.clone();
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(job_id = %id, error = %e, "job ended with error, scanning for orphans");
                    cleanup.scan_orphans(started).await;
                }
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        "job task panicked"
                    } else {
                        "job task was aborted"
                    };
                    tracing::error!(job_id = %id, error = %join_error, "{reason}");
                    store.update(id, JobUpdate::failed(format!("Internal error: {reason}")));
                    cleanup.delete_artifacts(&[id]).await;
                    cleanup.scan_orphans(started).await;
                }
            }
            active.lock().remove(&id);
        });
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server listens on `server.api.bind_address` (default: 127.0.0.1:6790).
    pub fn spawn_api_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let fetcher = Arc::new(self.clone());
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(fetcher, config).await })
    }

    /// Gracefully shut down the fetcher
    ///
    /// 1. Stops accepting new jobs
    /// 2. Cancels every running job through the store and its token
    /// 3. Waits for running jobs to reach a terminal state (30 seconds at most)
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.active.shutting_down.store(true, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        let running = self.active.ids();
        tracing::debug!(active_count = running.len(), "Cancelling active jobs");
        for id in &running {
            self.store.cancel(*id);
        }
        self.active.shutdown.cancel();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All active jobs stopped"),
            Err(_) => tracing::warn!(
                remaining = self.active.len(),
                "Timeout waiting for jobs to stop, proceeding with shutdown"
            ),
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.active.len();
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "Waiting for active jobs to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
