//! Removal of partial and orphaned artifacts
//!
//! Two policies, usable together:
//! - [`CleanupService::delete_artifacts`] removes everything belonging to a
//!   list of known artifact ids: prefixed files, slideshow scratch
//!   directories, the renamed artifact a history record points at, and the
//!   record itself.
//! - [`CleanupService::scan_orphans`] removes UUID-named files modified since
//!   a job started that have no history record. Ids held through
//!   [`CleanupService::claim`] belong to running work and are skipped.
//!
//! Both are best-effort: individual failures are logged and counted, never
//! returned.

use crate::db::Database;
use crate::pipeline::scratch_dir;
use crate::types::JobId;
use crate::utils::{file_name_str, files_with_prefix};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const SCRATCH_PREFIX: &str = "_slideshow_";

/// File timestamps come from a coarser clock than `SystemTime::now()`
const MTIME_SLACK: Duration = Duration::from_secs(2);

#[allow(clippy::expect_used)] // literal pattern
fn uuid_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
            .expect("uuid pattern is valid")
    })
}

/// Artifact id a file or scratch directory name belongs to
fn artifact_id(name: &str) -> Option<JobId> {
    let name = name.strip_prefix(SCRATCH_PREFIX).unwrap_or(name);
    let found = uuid_prefix_regex().find(name)?;
    found.as_str().parse().ok()
}

/// What a cleanup pass did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Files and directories removed
    pub files_removed: usize,
    /// History records removed
    pub records_removed: usize,
    /// Removals that failed (logged)
    pub failures: usize,
}

impl CleanupReport {
    fn absorb(&mut self, other: CleanupReport) {
        self.files_removed += other.files_removed;
        self.records_removed += other.records_removed;
        self.failures += other.failures;
    }
}

type ClaimSet = Arc<Mutex<HashSet<JobId>>>;

fn lock_claims(claims: &ClaimSet) -> MutexGuard<'_, HashSet<JobId>> {
    claims.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks an artifact id as in use until dropped
#[derive(Debug)]
pub struct ArtifactClaim {
    id: JobId,
    claims: ClaimSet,
}

impl Drop for ArtifactClaim {
    fn drop(&mut self) {
        lock_claims(&self.claims).remove(&self.id);
    }
}

/// Deletes artifacts of failed or cancelled work
#[derive(Clone, Debug)]
pub struct CleanupService {
    download_dir: PathBuf,
    db: Arc<Database>,
    claims: ClaimSet,
}

impl CleanupService {
    /// Cleanup over `download_dir`, consulting `db` for history records
    pub fn new(download_dir: PathBuf, db: Arc<Database>) -> Self {
        Self {
            download_dir,
            db,
            claims: Arc::default(),
        }
    }

    /// Protect `id` from orphan scans while the returned guard lives
    pub fn claim(&self, id: JobId) -> ArtifactClaim {
        lock_claims(&self.claims).insert(id);
        ArtifactClaim {
            id,
            claims: self.claims.clone(),
        }
    }

    fn is_claimed(&self, id: JobId) -> bool {
        lock_claims(&self.claims).contains(&id)
    }

    /// Remove everything belonging to `ids`
    pub async fn delete_artifacts(&self, ids: &[JobId]) -> CleanupReport {
        let mut report = CleanupReport::default();
        for &id in ids {
            report.absorb(self.delete_one(id).await);
        }
        if report != CleanupReport::default() {
            info!(
                ids = ids.len(),
                files = report.files_removed,
                records = report.records_removed,
                failures = report.failures,
                "deleted artifacts"
            );
        }
        report
    }

    async fn delete_one(&self, id: JobId) -> CleanupReport {
        let mut report = CleanupReport::default();
        let prefix = id.to_string();

        for path in files_with_prefix(&self.download_dir, &prefix).await {
            remove_file(&path, &mut report).await;
        }

        let scratch = scratch_dir(&self.download_dir, id);
        if tokio::fs::metadata(&scratch).await.is_ok() {
            match tokio::fs::remove_dir_all(&scratch).await {
                Ok(()) => report.files_removed += 1,
                Err(e) => {
                    warn!(dir = ?scratch, error = %e, "failed to remove scratch directory");
                    report.failures += 1;
                }
            }
        }

        match self.db.get_history(id).await {
            Ok(Some(record)) => {
                if tokio::fs::metadata(&record.file_path).await.is_ok() {
                    remove_file(&record.file_path, &mut report).await;
                }
                match self.db.delete_history(id).await {
                    Ok(true) => report.records_removed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(job_id = %id, error = %e, "failed to delete history record");
                        report.failures += 1;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(job_id = %id, error = %e, "failed to look up history record");
                report.failures += 1;
            }
        }
        report
    }

    /// Remove UUID-named entries of the download directory modified at or
    /// after `since` that have no history record
    pub async fn scan_orphans(&self, since: SystemTime) -> CleanupReport {
        let dir = self.download_dir.as_path();
        let mut report = CleanupReport::default();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = ?dir, error = %e, "cannot scan for orphans");
                return report;
            }
        };
        let threshold = since.checked_sub(MTIME_SLACK).unwrap_or(since);

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Some(id) = file_name_str(&path).and_then(artifact_id) else {
                continue;
            };
            if self.is_claimed(id) {
                continue;
            }

            // Entries can disappear underneath us; other jobs share the directory
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let recent = metadata.modified().is_ok_and(|modified| modified >= threshold);
            if !recent {
                continue;
            }

            match self.db.history_exists(id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(job_id = %id, error = %e, "cannot check history, keeping file");
                    continue;
                }
            }

            if metadata.is_dir() {
                match tokio::fs::remove_dir_all(&path).await {
                    Ok(()) => report.files_removed += 1,
                    Err(e) => {
                        warn!(path = ?path, error = %e, "failed to remove orphan directory");
                        report.failures += 1;
                    }
                }
            } else {
                remove_file(&path, &mut report).await;
            }
        }

        if report.files_removed > 0 {
            info!(dir = ?dir, removed = report.files_removed, "removed orphan files");
        }
        report
    }
}

async fn remove_file(path: &Path, report: &mut CleanupReport) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = ?path, "removed file");
            report.files_removed += 1;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = ?path, error = %e, "failed to remove file");
            report.failures += 1;
        }
    }
}
