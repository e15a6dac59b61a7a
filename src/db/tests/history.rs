use super::record;
use crate::db::*;
use crate::types::JobId;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_insert_and_get_history() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let entry = record("Clip", Some("user-1"), 0);
    db.insert_history(&entry).await.unwrap();

    let retrieved = db.get_history(entry.id).await.unwrap().unwrap();
    assert_eq!(retrieved.id, entry.id);
    assert_eq!(retrieved.user_id.as_deref(), Some("user-1"));
    assert_eq!(retrieved.title, "Clip");
    assert_eq!(retrieved.media_id.as_deref(), Some("media-Clip"));
    assert_eq!(retrieved.file_path, entry.file_path);
    assert_eq!(retrieved.file_size, Some(1024));
    assert_eq!(retrieved.duration, Some(61.5));
    assert_eq!(retrieved.created_at.timestamp(), entry.created_at.timestamp());

    db.close().await;
}

#[tokio::test]
async fn test_get_unknown_history_is_none() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(db.get_history(JobId::new()).await.unwrap().is_none());
    assert!(!db.history_exists(JobId::new()).await.unwrap());

    db.close().await;
}

#[tokio::test]
async fn test_insert_replaces_existing_record() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let mut entry = record("First", None, 0);
    db.insert_history(&entry).await.unwrap();
    entry.title = "Renamed".to_string();
    db.insert_history(&entry).await.unwrap();

    assert_eq!(db.count_history().await.unwrap(), 1);
    assert_eq!(db.get_history(entry.id).await.unwrap().unwrap().title, "Renamed");

    db.close().await;
}

#[tokio::test]
async fn test_delete_history() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let entry = record("Gone", None, 0);
    db.insert_history(&entry).await.unwrap();
    assert!(db.history_exists(entry.id).await.unwrap());

    assert!(db.delete_history(entry.id).await.unwrap());
    assert!(!db.history_exists(entry.id).await.unwrap());
    assert!(!db.delete_history(entry.id).await.unwrap());

    db.close().await;
}

#[tokio::test]
async fn test_list_history_pagination() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    for i in 0..5 {
        db.insert_history(&record(&format!("Item.{i}"), None, i * 60))
            .await
            .unwrap();
    }

    let page1 = db.list_history(3, 0).await.unwrap();
    assert_eq!(page1.len(), 3);
    assert_eq!(page1[0].title, "Item.0"); // Most recent first

    let page2 = db.list_history(3, 3).await.unwrap();
    assert_eq!(page2.len(), 2);
    assert_eq!(page2[0].title, "Item.3");

    assert_eq!(db.count_history().await.unwrap(), 5);

    db.close().await;
}

#[tokio::test]
async fn test_trim_history_keeps_newest_per_user() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    for i in 0..4 {
        db.insert_history(&record(&format!("A.{i}"), Some("alice"), i * 60))
            .await
            .unwrap();
    }
    db.insert_history(&record("B.0", Some("bob"), 600)).await.unwrap();

    let removed = db.trim_history(Some("alice"), 2).await.unwrap();
    let mut titles: Vec<String> = removed.into_iter().map(|r| r.title).collect();
    titles.sort();
    assert_eq!(titles, vec!["A.2", "A.3"]);

    let remaining: Vec<String> = db
        .list_history(10, 0)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(remaining, vec!["A.0", "A.1", "B.0"]);

    db.close().await;
}

#[tokio::test]
async fn test_trim_history_without_owner() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    for i in 0..3 {
        db.insert_history(&record(&format!("Anon.{i}"), None, i * 60))
            .await
            .unwrap();
    }
    db.insert_history(&record("Owned", Some("carol"), 900)).await.unwrap();

    let removed = db.trim_history(None, 1).await.unwrap();
    assert_eq!(removed.len(), 2);
    assert_eq!(db.count_history().await.unwrap(), 2);

    // Nothing beyond the limit
    assert!(db.trim_history(None, 1).await.unwrap().is_empty());

    db.close().await;
}
