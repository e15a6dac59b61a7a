mod history;

use crate::types::{HistoryRecord, JobId};
use chrono::{Duration, Utc};
use std::path::PathBuf;

/// History record for `title`, written `age_secs` seconds ago
pub(super) fn record(title: &str, user_id: Option<&str>, age_secs: i64) -> HistoryRecord {
    let id = JobId::new();
    HistoryRecord {
        id,
        user_id: user_id.map(String::from),
        source_url: format!("https://v.example.com/{title}"),
        title: title.to_string(),
        media_id: Some(format!("media-{title}")),
        format: "mp4".to_string(),
        quality: "720p".to_string(),
        file_path: PathBuf::from(format!("/downloads/{title}.mp4")),
        file_size: Some(1024),
        duration: Some(61.5),
        created_at: Utc::now() - Duration::seconds(age_secs),
    }
}
