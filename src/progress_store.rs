//! In-memory job progress store
//!
//! The store is the only channel between a running job and its observers. Jobs
//! write partial updates; SSE pollers and API handlers read snapshots. Every
//! operation takes one short lock on the internal map and never touches disk or
//! network.

use crate::error::CANCELLED_MESSAGE;
use crate::types::{CompletedItem, FailedItem, JobId, JobKind, JobStatus, Phase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use utoipa::ToSchema;

/// Snapshot of one job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobState {
    /// Job id
    pub id: JobId,
    /// Single or batch
    pub kind: JobKind,
    /// Current status
    pub status: JobStatus,
    /// Current phase
    pub phase: Phase,
    /// Overall progress, 0-100
    pub progress: f64,
    /// Transfer speed in bytes per second
    pub speed: Option<f64>,
    /// Seconds remaining
    pub eta: Option<u64>,
    /// Extra phase text (e.g. "Image 2 of 5")
    pub phase_detail: Option<String>,
    /// Failure text, set on `error`
    pub error: Option<String>,
    /// Cancellation requested
    pub cancelled: bool,
    /// Title of the fetched media, set on `done`
    pub title: Option<String>,
    /// Artifact id to retrieve, set on `done`
    pub download_id: Option<JobId>,
    /// Platform-side media id, set on `done`
    pub media_id: Option<String>,
    /// Batch aggregate, present for batch jobs; serialized inline
    #[serde(flatten)]
    pub batch: Option<BatchState>,
    /// Creation time
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    /// Last write time
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl JobState {
    fn new(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: JobKind::Single,
            status: JobStatus::Waiting,
            phase: Phase::Starting,
            progress: 0.0,
            speed: None,
            eta: None,
            phase_detail: None,
            error: None,
            cancelled: false,
            title: None,
            download_id: None,
            media_id: None,
            batch: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Aggregate state of a batch job
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchState {
    /// Number of sources in the batch
    pub total: usize,
    /// Items that finished successfully
    pub completed: usize,
    /// Title of the item in flight
    pub current_title: String,
    /// Progress of the item in flight, 0-100
    pub current_progress: f64,
    /// Items that failed
    pub failed: Vec<FailedItem>,
    /// Items that finished, in order
    pub completed_items: Vec<CompletedItem>,
}

/// Partial update merged into a job's state
///
/// Only fields that are set are written. `speed`/`eta` use a nested option so a
/// write can clear them.
#[derive(Clone, Debug, Default)]
pub struct JobUpdate {
    kind: Option<JobKind>,
    status: Option<JobStatus>,
    phase: Option<Phase>,
    progress: Option<f64>,
    speed: Option<Option<f64>>,
    eta: Option<Option<u64>>,
    phase_detail: Option<Option<String>>,
    error: Option<String>,
    title: Option<String>,
    download_id: Option<JobId>,
    media_id: Option<Option<String>>,
    batch: Option<BatchState>,
}

impl JobUpdate {
    /// Empty update
    pub fn new() -> Self {
        Self::default()
    }

    /// In-flight update: `downloading` in `phase` at `progress`
    pub fn downloading(phase: Phase, progress: f64) -> Self {
        Self::new()
            .status(JobStatus::Downloading)
            .phase(phase)
            .progress(progress)
    }

    /// Terminal success
    pub fn done(title: impl Into<String>, download_id: JobId) -> Self {
        Self::new()
            .status(JobStatus::Done)
            .phase(Phase::Done)
            .progress(100.0)
            .transfer_rate(None, None)
            .title(title)
            .download_id(download_id)
    }

    /// Terminal failure
    pub fn failed(error: impl Into<String>) -> Self {
        Self::new()
            .status(JobStatus::Error)
            .phase(Phase::Error)
            .progress(0.0)
            .transfer_rate(None, None)
            .error(error)
    }

    /// Set the job kind
    pub fn kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the status
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the phase
    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Set overall progress (rounded to one decimal)
    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some((progress.clamp(0.0, 100.0) * 10.0).round() / 10.0);
        self
    }

    /// Set or clear speed and eta
    pub fn transfer_rate(mut self, speed: Option<f64>, eta: Option<u64>) -> Self {
        self.speed = Some(speed);
        self.eta = Some(eta);
        self
    }

    /// Set or clear the phase detail text
    pub fn phase_detail(mut self, detail: Option<String>) -> Self {
        self.phase_detail = Some(detail);
        self
    }

    /// Set the error text
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set the title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the retrievable artifact id
    pub fn download_id(mut self, id: JobId) -> Self {
        self.download_id = Some(id);
        self
    }

    /// Set the platform media id
    pub fn media_id(mut self, media_id: Option<String>) -> Self {
        self.media_id = Some(media_id);
        self
    }

    /// Replace the batch aggregate
    pub fn batch(mut self, batch: BatchState) -> Self {
        self.batch = Some(batch);
        self
    }
}

struct Entry {
    created: Instant,
    state: JobState,
}

/// Concurrency-safe job id → state map with lazy TTL eviction
pub struct ProgressStore {
    ttl: Duration,
    jobs: Mutex<HashMap<JobId, Entry>>,
}

impl std::fmt::Debug for ProgressStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStore")
            .field("ttl", &self.ttl)
            .field("jobs", &self.len())
            .finish()
    }
}

impl ProgressStore {
    /// Create a store whose entries expire `ttl` after creation
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Entry>> {
        // A panic while holding the lock cannot leave a half-merged entry behind
        // (merges only assign fields), so a poisoned map is still consistent.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Merge `update` into the job's state, creating the entry if absent
    ///
    /// Returns `false` when the job is already terminal and the write was dropped.
    pub fn update(&self, id: JobId, update: JobUpdate) -> bool {
        let mut jobs = self.lock();
        let entry = jobs.entry(id).or_insert_with(|| Entry {
            created: Instant::now(),
            state: JobState::new(id),
        });
        let state = &mut entry.state;

        if state.status.is_terminal() {
            tracing::debug!(job_id = %id, status = state.status.as_str(), "ignoring write to terminal job");
            return false;
        }

        // Every terminal write on a cancelled job reports the cancellation
        let mut update = update;
        let terminal = update.status.is_some_and(|s| s.is_terminal());
        if state.cancelled && terminal && update.error.as_deref() != Some(CANCELLED_MESSAGE) {
            tracing::warn!(job_id = %id, "job was cancelled, rewriting terminal state");
            let batch = update.batch.take();
            update = JobUpdate::failed(CANCELLED_MESSAGE);
            update.batch = batch;
        }

        if let Some(kind) = update.kind {
            state.kind = kind;
        }
        if let Some(status) = update.status {
            state.status = status;
        }
        if let Some(progress) = update.progress {
            // Within one phase progress never moves backwards
            let same_phase = update.phase.is_none_or(|phase| phase == state.phase);
            let terminal = state.status.is_terminal();
            state.progress = if same_phase && !terminal {
                progress.max(state.progress)
            } else {
                progress
            };
        }
        if let Some(phase) = update.phase {
            state.phase = phase;
        }
        if let Some(speed) = update.speed {
            state.speed = speed;
        }
        if let Some(eta) = update.eta {
            state.eta = eta;
        }
        if let Some(detail) = update.phase_detail {
            state.phase_detail = detail;
        }
        if let Some(error) = update.error {
            state.error = Some(error);
        }
        if let Some(title) = update.title {
            state.title = Some(title);
        }
        if let Some(download_id) = update.download_id {
            state.download_id = Some(download_id);
        }
        if let Some(media_id) = update.media_id {
            state.media_id = media_id;
        }
        if let Some(batch) = update.batch {
            state.batch = Some(batch);
        }
        state.updated_at = Utc::now();
        true
    }

    /// Current snapshot, after evicting every expired entry
    pub fn get(&self, id: JobId) -> Option<JobState> {
        let mut jobs = self.lock();
        let ttl = self.ttl;
        let before = jobs.len();
        jobs.retain(|_, entry| entry.created.elapsed() < ttl);
        let evicted = before - jobs.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted expired jobs from progress store");
        }
        jobs.get(&id).map(|entry| entry.state.clone())
    }

    /// Request cancellation, creating a minimal record if the job has not started
    pub fn cancel(&self, id: JobId) {
        let mut jobs = self.lock();
        let entry = jobs.entry(id).or_insert_with(|| Entry {
            created: Instant::now(),
            state: JobState::new(id),
        });
        entry.state.cancelled = true;
        entry.state.updated_at = Utc::now();
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self, id: JobId) -> bool {
        self.lock()
            .get(&id)
            .is_some_and(|entry| entry.state.cancelled)
    }

    /// Drop a job's entry
    pub fn remove(&self, id: JobId) -> Option<JobState> {
        self.lock().remove(&id).map(|entry| entry.state)
    }

    /// Ids of jobs that have not reached a terminal state
    pub fn active_ids(&self) -> Vec<JobId> {
        self.lock()
            .values()
            .filter(|entry| !entry.state.status.is_terminal())
            .map(|entry| entry.state.id)
            .collect()
    }

    /// Number of tracked jobs (including expired ones not yet evicted)
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store tracks no jobs
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}
