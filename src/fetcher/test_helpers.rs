//! Shared test helpers for creating MediaFetcher instances in tests.

use super::{JobRunner, MediaFetcher};
use crate::config::Config;
use crate::db::Database;
use crate::extraction::ExtractionStrategy;
use crate::pipeline::test_helpers::{StubBackend, StubMediaTool};
use crate::progress_store::{JobState, ProgressStore};
use crate::transfer::TransferBackend;
use crate::types::{JobId, MediaMetadata};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::{TempDir, tempdir};

/// Strategy naming every source after the last segment of its URL
#[derive(Default)]
pub(crate) struct TitleFromUrl {
    calls: AtomicUsize,
}

impl TitleFromUrl {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionStrategy for TitleFromUrl {
    async fn extract(&self, url: &str) -> crate::Result<Option<MediaMetadata>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let title = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
        Ok(Some(MediaMetadata {
            media_id: Some(format!("m-{title}")),
            title: Some(title.to_string()),
            ..Default::default()
        }))
    }

    fn name(&self) -> &'static str {
        "title-from-url"
    }
}

/// A fetcher wired to stub collaborators, plus handles to inspect them
pub(crate) struct TestHarness<B = StubBackend> {
    pub fetcher: MediaFetcher,
    pub runner: Arc<JobRunner>,
    pub store: Arc<ProgressStore>,
    pub db: Arc<Database>,
    pub backend: Arc<B>,
    pub tool: Arc<StubMediaTool>,
    pub strategy: Arc<TitleFromUrl>,
    pub download_dir: PathBuf,
    _temp: TempDir,
}

/// Build a fetcher over `backend` and `tool` in a fresh temp directory
///
/// The database lives next to (not inside) the download directory so
/// directory listings only show artifacts.
pub(crate) async fn harness(backend: StubBackend, tool: StubMediaTool) -> TestHarness {
    harness_with(Arc::new(backend), tool, |_| {}).await
}

/// Like [`harness`], for any backend and with a chance to adjust the config
pub(crate) async fn harness_with<B>(
    backend: Arc<B>,
    tool: StubMediaTool,
    configure: impl FnOnce(&mut Config),
) -> TestHarness<B>
where
    B: TransferBackend + 'static,
{
    let temp = tempdir().unwrap();

    let mut config = Config::default();
    config.download.download_dir = temp.path().join("downloads");
    config.persistence.database_path = temp.path().join("history.db");
    configure(&mut config);
    std::fs::create_dir_all(&config.download.download_dir).unwrap();

    let db = Arc::new(Database::new(&config.persistence.database_path).await.unwrap());
    let tool = Arc::new(tool);
    let strategy = Arc::new(TitleFromUrl::default());
    let download_dir = config.download.download_dir.clone();

    let fetcher = MediaFetcher::with_components(
        config,
        db.clone(),
        backend.clone(),
        tool.clone(),
        vec![strategy.clone() as Arc<dyn ExtractionStrategy>],
    )
    .unwrap();

    TestHarness {
        runner: fetcher.runner.clone(),
        store: fetcher.store.clone(),
        fetcher,
        db,
        backend,
        tool,
        strategy,
        download_dir,
        _temp: temp,
    }
}

/// Sorted file names in `dir`
pub(crate) fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Poll the store until `id` is terminal (5 second limit)
pub(crate) async fn wait_terminal(store: &ProgressStore, id: JobId) -> JobState {
    for _ in 0..500 {
        if let Some(state) = store.get(id)
            && state.status.is_terminal()
        {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not reach a terminal state");
}
