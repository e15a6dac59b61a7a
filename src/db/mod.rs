//! Database layer for media-fetch
//!
//! Handles SQLite persistence of the artifact history. The history table is
//! what artifact retrieval reads paths from and what orphan cleanup checks
//! before deleting a file.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`history`] — History records

use crate::types::{HistoryRecord, JobId};
use chrono::{TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod history;
mod migrations;

/// History record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    /// Artifact id
    pub id: JobId,
    /// Owner label
    pub user_id: Option<String>,
    /// Canonical source URL
    pub source_url: String,
    /// Title
    pub title: String,
    /// Platform-side media id
    pub media_id: Option<String>,
    /// Output format
    pub format: String,
    /// Quality label
    pub quality: String,
    /// Final artifact path
    pub file_path: String,
    /// Artifact size in bytes
    pub file_size: Option<i64>,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Unix timestamp when the record was written
    pub created_at: i64,
}

impl From<HistoryRow> for HistoryRecord {
    fn from(row: HistoryRow) -> Self {
        HistoryRecord {
            id: row.id,
            user_id: row.user_id,
            source_url: row.source_url,
            title: row.title,
            media_id: row.media_id,
            format: row.format,
            quality: row.quality,
            file_path: PathBuf::from(row.file_path),
            file_size: row.file_size.map(|s| s as u64),
            duration: row.duration,
            created_at: Utc
                .timestamp_opt(row.created_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Database handle for media-fetch
pub struct Database {
    pool: SqlitePool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
