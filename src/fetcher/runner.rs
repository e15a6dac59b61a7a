//! Execution of one source from resolution to history record

use crate::cleanup::CleanupService;
use crate::db::Database;
use crate::error::{CANCELLED_MESSAGE, Result};
use crate::extraction::{ExtractionResolver, normalize_url};
use crate::pipeline::{JobReporter, Pipeline, ProgressReporter};
use crate::progress_store::{JobUpdate, ProgressStore};
use crate::types::{FetchRequest, FetchResult, HistoryRecord, JobId, JobKind};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared state every job task runs against
#[derive(Debug)]
pub(crate) struct JobRunner {
    pub(crate) store: Arc<ProgressStore>,
    pub(crate) resolver: Arc<ExtractionResolver>,
    pub(crate) pipeline: Arc<Pipeline>,
    pub(crate) db: Arc<Database>,
    pub(crate) cleanup: CleanupService,
    pub(crate) history_keep: u32,
}

impl JobRunner {
    /// Resolve, fetch and record one source as artifact `artifact_id`
    ///
    /// Nothing is cleaned up on failure; the caller decides what to delete.
    pub(crate) async fn fetch_item(
        &self,
        request: &FetchRequest,
        artifact_id: JobId,
        reporter: &mut dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<FetchResult> {
        let _claim = self.cleanup.claim(artifact_id);

        let metadata = self.resolver.resolve(&request.url).await?;
        let result = self
            .pipeline
            .run(request, &metadata, artifact_id, reporter, cancel)
            .await?;

        let record = HistoryRecord::from_result(
            &result,
            normalize_url(&request.url),
            request.user_id.clone(),
        );
        if let Err(e) = self.db.insert_history(&record).await {
            error!(job_id = %artifact_id, error = %e, "failed to record history");
            if let Err(remove) = tokio::fs::remove_file(&result.file_path).await {
                warn!(path = ?result.file_path, error = %remove, "failed to remove unrecorded artifact");
            }
            return Err(e);
        }

        self.trim_history(request.user_id.as_deref()).await;
        Ok(result)
    }

    /// Drop the oldest records of `user_id` beyond the keep limit, with their files
    async fn trim_history(&self, user_id: Option<&str>) {
        let removed = match self.db.trim_history(user_id, self.history_keep).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(user_id = ?user_id, error = %e, "failed to trim history");
                return;
            }
        };
        for record in removed {
            match tokio::fs::remove_file(&record.file_path).await {
                Ok(()) => debug!(job_id = %record.id, path = ?record.file_path, "removed trimmed artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = ?record.file_path, error = %e, "failed to remove trimmed artifact"),
            }
        }
    }

    /// Body of a single-source job; the job id doubles as the artifact id
    ///
    /// Always leaves the job in a terminal state. Returns the error the job
    /// ended with so the supervisor can run its orphan scan.
    pub(crate) async fn run_single(
        &self,
        id: JobId,
        request: FetchRequest,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.store.update(id, JobUpdate::new().kind(JobKind::Single));
        let mut reporter = JobReporter::new(self.store.clone(), id);

        match self.fetch_item(&request, id, &mut reporter, &cancel).await {
            Ok(_) if self.store.is_cancelled(id) => {
                info!(job_id = %id, "job cancelled after transfer, discarding artifact");
                self.cleanup.delete_artifacts(&[id]).await;
                self.store.update(id, JobUpdate::failed(CANCELLED_MESSAGE));
                Err(crate::Error::Cancelled)
            }
            Ok(result) => {
                info!(job_id = %id, title = %result.title, "job finished");
                self.store.update(
                    id,
                    JobUpdate::done(result.title, id).media_id(result.media_id),
                );
                Ok(())
            }
            Err(e) if e.is_cancellation() || self.store.is_cancelled(id) => {
                info!(job_id = %id, error = %e, "job cancelled");
                self.cleanup.delete_artifacts(&[id]).await;
                self.store.update(id, JobUpdate::failed(CANCELLED_MESSAGE));
                Err(crate::Error::Cancelled)
            }
            Err(e) => {
                error!(job_id = %id, url = %request.url, error = %e, "job failed");
                self.cleanup.delete_artifacts(&[id]).await;
                self.store.update(id, JobUpdate::failed(e.to_string()));
                Err(e)
            }
        }
    }
}
