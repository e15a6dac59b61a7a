//! Custom test assertions for E2E tests

use media_fetch::{JobId, JobState, MediaFetcher};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Result of waiting for a job to finish
#[derive(Debug)]
pub enum WaitResult {
    /// Job finished successfully
    Done(JobState),
    /// Job failed with error
    Failed(String),
    /// Timeout waiting for a terminal state
    Timeout,
    /// Snapshot disappeared (evicted or never existed)
    Missing,
}

/// Poll the progress store until `id` is terminal
///
/// Also checks that progress never decreases before the terminal write.
pub async fn wait_for_completion(fetcher: &MediaFetcher, id: JobId, timeout: Duration) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        let mut last_progress = 0.0;
        loop {
            let Some(state) = fetcher.progress(id) else {
                return WaitResult::Missing;
            };
            if state.status.is_terminal() {
                return match state.error.clone() {
                    Some(error) => WaitResult::Failed(error),
                    None => WaitResult::Done(state),
                };
            }

            assert!(
                state.progress >= last_progress,
                "progress went backwards: {} -> {}",
                last_progress,
                state.progress
            );
            last_progress = state.progress;
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Wait until the job reports a transfer in progress
pub async fn wait_for_downloading(fetcher: &MediaFetcher, id: JobId, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, async {
        loop {
            if let Some(state) = fetcher.progress(id)
                && state.progress > 0.0
            {
                return !state.status.is_terminal();
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .unwrap_or(false)
}

/// Files directly inside `dir`
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Assert that no file in `dir` carries the job's id prefix
pub fn assert_no_artifacts(dir: &Path, id: JobId) {
    let prefix = id.to_string();
    let leftovers: Vec<PathBuf> = list_files(dir)
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();
    assert!(leftovers.is_empty(), "leftover artifacts: {leftovers:?}");
}
