//! History record operations.

use crate::types::{HistoryRecord, JobId};
use crate::{Error, Result};

use super::{Database, HistoryRow};

const HISTORY_COLUMNS: &str = "id, user_id, source_url, title, media_id, format, quality, \
                               file_path, file_size, duration, created_at";

impl Database {
    /// Insert (or replace) the record for a finished artifact
    pub async fn insert_history(&self, record: &HistoryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO history (
                id, user_id, source_url, title, media_id, format, quality,
                file_path, file_size, duration, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.source_url)
        .bind(&record.title)
        .bind(&record.media_id)
        .bind(&record.format)
        .bind(&record.quality)
        .bind(record.file_path.to_string_lossy().into_owned())
        .bind(record.file_size.map(|s| s as i64))
        .bind(record.duration)
        .bind(record.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(())
    }

    /// Get a single history record by artifact id
    pub async fn get_history(&self, id: JobId) -> Result<Option<HistoryRecord>> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row.map(HistoryRecord::from))
    }

    /// Whether a record exists for `id`
    pub async fn history_exists(&self, id: JobId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM history WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(count > 0)
    }

    /// Delete the record for `id`
    ///
    /// Returns whether a record was removed.
    pub async fn delete_history(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM history WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Records ordered newest first
    pub async fn list_history(&self, limit: usize, offset: usize) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history \
             ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(HistoryRecord::from).collect())
    }

    /// Count history records
    pub async fn count_history(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM history")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(count)
    }

    /// Keep only the newest `keep` records of `user_id`
    ///
    /// `None` addresses records without an owner. Returns the removed records
    /// so the caller can delete their artifacts.
    pub async fn trim_history(&self, user_id: Option<&str>, keep: u32) -> Result<Vec<HistoryRecord>> {
        let stale = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history WHERE user_id IS ? \
             ORDER BY created_at DESC, rowid DESC LIMIT -1 OFFSET ?"
        ))
        .bind(user_id)
        .bind(i64::from(keep))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        let mut removed = Vec::with_capacity(stale.len());
        for row in stale {
            if self.delete_history(row.id).await? {
                removed.push(HistoryRecord::from(row));
            }
        }

        if !removed.is_empty() {
            tracing::debug!(user_id = ?user_id, removed = removed.len(), "trimmed history");
        }
        Ok(removed)
    }
}
