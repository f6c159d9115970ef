// ABOUTME: Tests for the JSON file state backend
// ABOUTME: Verifies persistence across instances and atomic replacement of the document

use mysql_clickhouse_sync::error::StateError;
use mysql_clickhouse_sync::sync::{CursorValue, FileStateStore, StateStore, SyncState};
use tempfile::TempDir;

#[tokio::test]
async fn test_state_survives_new_store_instance() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let store = FileStateStore::new(&path);
    store
        .save("orders", &SyncState::new(CursorValue::Int(42), 1_700_000_000))
        .await
        .unwrap();

    let reopened = FileStateStore::new(&path);
    let state = reopened.load("orders").await.unwrap().unwrap();
    assert_eq!(state.last_id, CursorValue::Int(42));
    assert_eq!(state.last_sync_time, 1_700_000_000);
}

#[tokio::test]
async fn test_multiple_tables_share_one_document() {
    let dir = TempDir::new().unwrap();
    let store = FileStateStore::new(dir.path().join("state.json"));

    store
        .save("orders", &SyncState::new(CursorValue::Int(1), 10))
        .await
        .unwrap();
    store
        .save("users", &SyncState::new(CursorValue::Text("u-9".to_string()), 20))
        .await
        .unwrap();
    store
        .save("orders", &SyncState::new(CursorValue::Int(2), 30))
        .await
        .unwrap();

    let document = store.read_document().await.unwrap();
    assert_eq!(document.tables.len(), 2);
    assert_eq!(document.tables["orders"].last_id, CursorValue::Int(2));
    assert_eq!(
        document.tables["users"].last_id,
        CursorValue::Text("u-9".to_string())
    );
    assert!(document.updated_at.is_some());
}

#[tokio::test]
async fn test_missing_file_is_empty_state() {
    let dir = TempDir::new().unwrap();
    let store = FileStateStore::new(dir.path().join("nested").join("state.json"));

    assert!(store.load("orders").await.unwrap().is_none());
    assert!(store.read_document().await.unwrap().tables.is_empty());

    // Saving creates the parent directory.
    store
        .save("orders", &SyncState::new(CursorValue::Int(5), 1))
        .await
        .unwrap();
    assert!(dir.path().join("nested").join("state.json").exists());
}

#[tokio::test]
async fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = FileStateStore::new(&path);
    let err = store.load("orders").await.unwrap_err();
    assert!(matches!(err, StateError::Serde(_)));
}

#[tokio::test]
async fn test_save_replaces_malformed_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ truncated").unwrap();

    let store = FileStateStore::new(&path);
    store
        .save("orders", &SyncState::new(CursorValue::Int(7), 1_700_000_000))
        .await
        .unwrap();

    let state = store.load("orders").await.unwrap().unwrap();
    assert_eq!(state.last_id, CursorValue::Int(7));
}

#[tokio::test]
async fn test_save_leaves_no_temporary_files() {
    let dir = TempDir::new().unwrap();
    let store = FileStateStore::new(dir.path().join("state.json"));

    for id in 1..=5 {
        store
            .save("orders", &SyncState::new(CursorValue::Int(id), id))
            .await
            .unwrap();
    }

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("state.json")]);

    let contents = std::fs::read_to_string(dir.path().join("state.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(parsed["tables"]["orders"]["last_id"], 5);
}
