use super::*;
use crate::error::StorageError;
use std::sync::Arc;
use tempfile::TempDir;

fn record(timestamp_ms: u64, lifetime_count: u64, interval_events: u64) -> AggregationRecord {
    AggregationRecord::new(timestamp_ms, lifetime_count, interval_events)
}

fn memory_log(max_entries: usize) -> (Arc<MemoryLineStore>, BoundedLog) {
    let store = Arc::new(MemoryLineStore::new());
    let log = BoundedLog::new(store.clone(), "data.csv", max_entries);
    (store, log)
}

#[tokio::test]
async fn test_absent_log_reads_as_empty() {
    let (_store, log) = memory_log(3);

    assert!(log.records().await.unwrap().is_empty());
    assert_eq!(log.render_json().await, "[]");
}

#[tokio::test]
async fn test_append_evicts_oldest_first() {
    let (_store, log) = memory_log(3);

    for r in [record(10, 1, 1), record(20, 2, 1), record(30, 4, 2)] {
        log.append(&r).await.unwrap();
    }
    let retained = log.append(&record(40, 5, 1)).await.unwrap();

    assert_eq!(retained, 3);
    assert_eq!(
        log.records().await.unwrap(),
        vec![record(20, 2, 1), record(30, 4, 2), record(40, 5, 1)]
    );
}

#[tokio::test]
async fn test_log_never_exceeds_capacity() {
    let (_store, log) = memory_log(5);

    for tick in 1..=23u64 {
        let retained = log.append(&record(tick * 1000, tick, 1)).await.unwrap();
        assert!(retained <= 5);
    }

    let timestamps: Vec<u64> = log
        .records()
        .await
        .unwrap()
        .iter()
        .map(|r| r.timestamp_ms)
        .collect();
    assert_eq!(timestamps, vec![19_000, 20_000, 21_000, 22_000, 23_000]);
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let (store, log) = memory_log(10);
    store.insert_raw("data.csv", ["10,1,1", "garbage", "20,2", "30,3,2"]);

    assert_eq!(
        log.records().await.unwrap(),
        vec![record(10, 1, 1), record(30, 3, 2)]
    );

    let points: serde_json::Value = serde_json::from_str(&log.render_json().await).unwrap();
    assert_eq!(points.as_array().unwrap().len(), 2);
    assert_eq!(points[1]["touchCount"], 3);
}

#[tokio::test]
async fn test_unavailable_store_renders_empty() {
    let (store, log) = memory_log(3);
    log.append(&record(10, 1, 1)).await.unwrap();

    store.set_available(false);

    assert!(matches!(
        log.append(&record(20, 2, 1)).await,
        Err(StorageError::Unavailable { .. })
    ));
    assert_eq!(log.render_json().await, "[]");

    store.set_available(true);
    assert_eq!(log.records().await.unwrap(), vec![record(10, 1, 1)]);
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let (store, log) = memory_log(3);
    log.append(&record(10, 1, 1)).await.unwrap();

    log.clear().await.unwrap();
    assert!(!store.contains("data.csv"));
    log.clear().await.unwrap();
    assert!(log.records().await.unwrap().is_empty());
}

#[test]
fn test_retain_newest() {
    let lines: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();

    assert_eq!(retain_newest(lines.clone(), 2), vec!["c", "d"]);
    assert_eq!(retain_newest(lines.clone(), 4), lines);
    assert_eq!(retain_newest(lines.clone(), 10), lines);
}

#[tokio::test]
async fn test_fs_store_round_trip_and_trim() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FsLineStore::new(temp_dir.path().join("data")));
    let log = BoundedLog::new(store.clone(), "data.csv", 2);

    log.append(&record(10, 1, 1)).await.unwrap();
    log.append(&record(20, 3, 2)).await.unwrap();
    log.append(&record(30, 3, 0)).await.unwrap();

    let content = std::fs::read_to_string(store.resource_path("data.csv")).unwrap();
    assert_eq!(content, "20,3,2\n30,3,0\n");
    assert!(!store.resource_path("data.csv.tmp").exists());

    log.clear().await.unwrap();
    assert!(!store.resource_path("data.csv").exists());
    log.clear().await.unwrap();
}

#[tokio::test]
async fn test_fs_append_after_torn_line() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FsLineStore::new(temp_dir.path()));
    std::fs::write(store.resource_path("data.csv"), "10,1,1\n20,2").unwrap();
    let log = BoundedLog::new(store.clone(), "data.csv", 10);

    log.append(&record(40, 0, 0)).await.unwrap();

    assert_eq!(
        log.records().await.unwrap(),
        vec![record(10, 1, 1), record(40, 0, 0)]
    );
    let content = std::fs::read_to_string(store.resource_path("data.csv")).unwrap();
    assert_eq!(content, "10,1,1\n20,2\n40,0,0\n");
}

#[tokio::test]
async fn test_fs_store_first_line() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsLineStore::new(temp_dir.path());

    assert_eq!(store.read_first_line("ssid.txt").await.unwrap(), None);

    store.write_line("ssid.txt", "home-net").await.unwrap();
    assert_eq!(
        store.read_first_line("ssid.txt").await.unwrap(),
        Some("home-net".to_string())
    );

    store.write_line("ssid.txt", "office").await.unwrap();
    assert_eq!(store.read_lines("ssid.txt").await.unwrap(), vec!["office"]);
}

#[tokio::test]
async fn test_credentials_save_load_clear() {
    let store = Arc::new(MemoryLineStore::new());
    let credentials = CredentialStore::new(store.clone(), "ssid.txt", "pass.txt");

    assert!(credentials.load().await.unwrap().is_none());

    credentials
        .save(&Credentials::new("home-net", "hunter2"))
        .await
        .unwrap();
    assert_eq!(
        credentials.load().await.unwrap(),
        Some(Credentials::new("home-net", "hunter2"))
    );

    credentials.clear().await.unwrap();
    assert!(credentials.load().await.unwrap().is_none());
    assert!(!store.contains("pass.txt"));
}

#[tokio::test]
async fn test_credentials_reject_line_breaks() {
    let store = Arc::new(MemoryLineStore::new());
    let credentials = CredentialStore::new(store.clone(), "ssid.txt", "pass.txt");

    assert!(matches!(
        credentials.save(&Credentials::new("home\nnet", "hunter2")).await,
        Err(StorageError::InvalidValue { .. })
    ));
    assert!(matches!(
        credentials.save(&Credentials::new("home-net", "hunter\r\n2")).await,
        Err(StorageError::InvalidValue { .. })
    ));
    assert!(!store.contains("ssid.txt"));
    assert!(!store.contains("pass.txt"));
}

#[test]
fn test_credentials_debug_redacts_password() {
    let rendered = format!("{:?}", Credentials::new("home-net", "hunter2"));
    assert!(rendered.contains("home-net"));
    assert!(!rendered.contains("hunter2"));
}
