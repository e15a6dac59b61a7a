//! Sequential processing of a list of sources under one job id
//!
//! Items run strictly one after another so the batch's single progress
//! record stays coherent. Each item gets a fresh artifact id and its
//! pipeline progress is folded into the batch's `current_progress`; the
//! overall `progress` advances by whole items. An item failure is recorded
//! in `failed` and the batch moves on. Cancellation is checked before every
//! item and through the item's own progress callbacks.

use crate::error::CANCELLED_MESSAGE;
use crate::fetcher::JobRunner;
use crate::pipeline::{PhaseSnapshot, ProgressReporter};
use crate::progress_store::{BatchState, JobUpdate, ProgressStore};
use crate::types::{
    BatchRequest, CompletedItem, FailedItem, JobId, JobKind, JobStatus, Phase,
};
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Overall batch progress with `index` items done and the current one at `item_progress`
fn overall_progress(index: usize, total: usize, item_progress: f64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let fraction = item_progress.clamp(0.0, 100.0) / 100.0;
    ((index as f64 + fraction) / total as f64 * 100.0).min(100.0)
}

/// Reporter that folds one item's progress into the batch record
struct BatchItemReporter<'a> {
    store: &'a ProgressStore,
    batch_id: JobId,
    state: &'a mut BatchState,
    index: usize,
}

impl ProgressReporter for BatchItemReporter<'_> {
    fn report(&mut self, snapshot: PhaseSnapshot) {
        self.state.current_progress = snapshot.progress;
        let overall = overall_progress(self.index, self.state.total, snapshot.progress);
        self.store.update(
            self.batch_id,
            JobUpdate::downloading(snapshot.phase, overall)
                .transfer_rate(snapshot.speed, snapshot.eta)
                .phase_detail(snapshot.detail)
                .batch(self.state.clone()),
        );
    }

    fn is_cancelled(&self) -> bool {
        self.store.is_cancelled(self.batch_id)
    }
}

/// Runs batch jobs against a shared [`JobRunner`]
#[derive(Debug, Clone)]
pub(crate) struct BatchCoordinator {
    runner: Arc<JobRunner>,
}

impl BatchCoordinator {
    pub(crate) fn new(runner: Arc<JobRunner>) -> Self {
        Self { runner }
    }

    /// Body of a batch job
    ///
    /// Always leaves the batch in a terminal state. Returns
    /// [`Error::Cancelled`](crate::Error::Cancelled) when the batch was
    /// cancelled so the supervisor runs its orphan scan.
    pub(crate) async fn run(
        &self,
        batch_id: JobId,
        request: BatchRequest,
        cancel: CancellationToken,
    ) -> crate::Result<()> {
        let store = self.runner.store.as_ref();
        let started = SystemTime::now();
        let total = request.urls.len();
        let mut state = BatchState {
            total,
            ..Default::default()
        };
        store.update(
            batch_id,
            JobUpdate::downloading(Phase::Starting, 0.0)
                .kind(JobKind::Batch)
                .batch(state.clone()),
        );
        info!(job_id = %batch_id, total, "batch started");

        let mut in_flight = None;
        let mut cancelled = false;

        for (index, url) in request.urls.iter().enumerate() {
            if store.is_cancelled(batch_id) {
                cancelled = true;
                break;
            }

            let item_id = JobId::new();
            state.current_title = url.clone();
            state.current_progress = 0.0;
            store.update(
                batch_id,
                JobUpdate::downloading(Phase::Starting, overall_progress(index, total, 0.0))
                    .batch(state.clone()),
            );

            let item = request.item(url);
            let outcome = {
                let mut reporter = BatchItemReporter {
                    store,
                    batch_id,
                    state: &mut state,
                    index,
                };
                self.runner
                    .fetch_item(&item, item_id, &mut reporter, &cancel)
                    .await
            };

            match outcome {
                Ok(result) => {
                    info!(job_id = %batch_id, item = index, title = %result.title, "batch item finished");
                    state.completed += 1;
                    state.current_title = result.title.clone();
                    state.current_progress = 100.0;
                    state.completed_items.push(CompletedItem {
                        download_id: result.download_id,
                        title: result.title,
                    });
                }
                Err(e) if e.is_cancellation() => {
                    in_flight = Some(item_id);
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(job_id = %batch_id, item = index, url = %url, error = %e, "batch item failed");
                    self.runner.cleanup.delete_artifacts(&[item_id]).await;
                    state.failed.push(FailedItem {
                        source: url.clone(),
                        error: e.to_string(),
                    });
                }
            }

            store.update(
                batch_id,
                JobUpdate::new()
                    .progress(overall_progress(index + 1, total, 0.0))
                    .batch(state.clone()),
            );
        }

        // A cancel that lands after the last item still discards the batch
        if !cancelled && store.is_cancelled(batch_id) {
            cancelled = true;
        }

        if cancelled {
            let mut ids: Vec<JobId> = state
                .completed_items
                .iter()
                .map(|item| item.download_id)
                .collect();
            ids.extend(in_flight);
            info!(job_id = %batch_id, discarded = ids.len(), "batch cancelled");

            self.runner.cleanup.delete_artifacts(&ids).await;
            self.runner.cleanup.scan_orphans(started).await;

            state.completed_items.clear();
            store.update(
                batch_id,
                JobUpdate::failed(CANCELLED_MESSAGE).batch(state),
            );
            return Err(crate::Error::Cancelled);
        }

        state.completed = total - state.failed.len();
        if state.completed == 0 {
            error!(job_id = %batch_id, total, "every batch item failed");
        } else {
            info!(
                job_id = %batch_id,
                completed = state.completed,
                failed = state.failed.len(),
                "batch finished"
            );
        }
        store.update(
            batch_id,
            JobUpdate::new()
                .status(JobStatus::Done)
                .phase(Phase::Done)
                .progress(100.0)
                .transfer_rate(None, None)
                .phase_detail(None)
                .batch(state),
        );
        Ok(())
    }
}
