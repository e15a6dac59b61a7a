//! Mapping transfer events onto phase bands

use crate::config::PhaseBands;
use crate::progress_store::{JobUpdate, ProgressStore};
use crate::types::{JobId, Phase, ProgressEvent};
use std::ops::ControlFlow;
use std::sync::Arc;

/// One computed progress point
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseSnapshot {
    /// Phase the job is in
    pub phase: Phase,
    /// Overall progress of the unit of work, 0-100
    pub progress: f64,
    /// Bytes per second
    pub speed: Option<f64>,
    /// Seconds remaining
    pub eta: Option<u64>,
    /// Extra text (e.g. "Image 2 of 5")
    pub detail: Option<String>,
}

impl PhaseSnapshot {
    fn at(phase: Phase, progress: f64) -> Self {
        Self {
            phase,
            progress,
            speed: None,
            eta: None,
            detail: None,
        }
    }
}

/// Where a pipeline run publishes its progress
///
/// Single jobs write straight into their own store record; batch items fold
/// the snapshot into the batch's `current_progress`.
pub trait ProgressReporter: Send {
    /// Publish a progress point
    fn report(&mut self, snapshot: PhaseSnapshot);

    /// Whether the owning job has been cancelled
    fn is_cancelled(&self) -> bool;
}

/// Reporter for a single job's own store record
pub struct JobReporter {
    store: Arc<ProgressStore>,
    id: JobId,
}

impl JobReporter {
    /// Report into `store` under `id`
    pub fn new(store: Arc<ProgressStore>, id: JobId) -> Self {
        Self { store, id }
    }
}

impl ProgressReporter for JobReporter {
    fn report(&mut self, snapshot: PhaseSnapshot) {
        self.store.update(
            self.id,
            JobUpdate::downloading(snapshot.phase, snapshot.progress)
                .transfer_rate(snapshot.speed, snapshot.eta)
                .phase_detail(snapshot.detail),
        );
    }

    fn is_cancelled(&self) -> bool {
        self.store.is_cancelled(self.id)
    }
}

/// Turns [`ProgressEvent`]s into [`PhaseSnapshot`]s for one pipeline run
///
/// The first distinct stream identity maps into the primary band and any
/// later one into the secondary band (falling back to primary when the kind
/// has none). Within a phase the reported value never decreases.
pub struct ProgressTracker<'a> {
    reporter: &'a mut dyn ProgressReporter,
    bands: PhaseBands,
    streams: Vec<String>,
    current_stream: usize,
    last: Option<PhaseSnapshot>,
}

impl<'a> ProgressTracker<'a> {
    /// Create a tracker over `bands`
    pub fn new(reporter: &'a mut dyn ProgressReporter, bands: PhaseBands) -> Self {
        Self {
            reporter,
            bands,
            streams: Vec::new(),
            current_stream: 0,
            last: None,
        }
    }

    /// Report `starting` at 0
    pub fn start(&mut self) {
        self.publish(PhaseSnapshot::at(Phase::Starting, 0.0));
    }

    /// Report the kind's finalize phase at its checkpoint
    pub fn finalize(&mut self) {
        let phase = self.bands.finalize_phase;
        let at = self.bands.finalize_at;
        self.publish(PhaseSnapshot::at(phase, at));
    }

    /// Whether the job has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.reporter.is_cancelled()
    }

    /// `Err(Cancelled)` if the job has been cancelled
    pub fn ensure_active(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Number of distinct streams seen so far
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Handle one backend event; `Break` means the job was cancelled
    pub fn on_event(&mut self, event: ProgressEvent) -> ControlFlow<()> {
        if self.reporter.is_cancelled() {
            return ControlFlow::Break(());
        }

        match event {
            ProgressEvent::Downloading {
                bytes_total,
                bytes_done,
                speed,
                eta,
                stream,
            } => {
                let index = self.stream_index(stream);
                let percent = match bytes_total {
                    Some(total) if total > 0 => bytes_done as f64 / total as f64 * 100.0,
                    _ => 0.0,
                };
                let (phase, band) = self.band_for(index);
                self.publish(PhaseSnapshot {
                    phase,
                    progress: band.scale(percent),
                    speed,
                    eta,
                    detail: None,
                });
            }
            ProgressEvent::Finished { stream } => {
                let index = self.stream_index(stream);
                let (phase, band) = self.band_for(index);
                self.publish(PhaseSnapshot::at(phase, band.end));
            }
            ProgressEvent::ItemProgress { index, total } => {
                let percent = if total == 0 {
                    100.0
                } else {
                    (index + 1) as f64 / total as f64 * 100.0
                };
                self.publish(PhaseSnapshot {
                    phase: Phase::DownloadingImages,
                    progress: self.bands.primary.scale(percent),
                    speed: None,
                    eta: None,
                    detail: Some(format!("Image {} of {}", index + 1, total)),
                });
            }
            ProgressEvent::ItemComplete { .. } => {}
        }
        ControlFlow::Continue(())
    }

    fn stream_index(&mut self, stream: Option<String>) -> usize {
        if let Some(name) = stream {
            self.current_stream = match self.streams.iter().position(|s| *s == name) {
                Some(index) => index,
                None => {
                    self.streams.push(name);
                    self.streams.len() - 1
                }
            };
        }
        self.current_stream
    }

    fn band_for(&self, index: usize) -> (Phase, crate::config::Band) {
        match (index, self.bands.secondary) {
            (0, _) | (_, None) => (Phase::DownloadingPrimary, self.bands.primary),
            (_, Some(secondary)) => (Phase::DownloadingSecondary, secondary),
        }
    }

    fn publish(&mut self, mut snapshot: PhaseSnapshot) {
        if let Some(last) = &self.last
            && last.phase == snapshot.phase
            && snapshot.progress < last.progress
        {
            snapshot.progress = last.progress;
        }
        self.last = Some(snapshot.clone());
        self.reporter.report(snapshot);
    }
}
