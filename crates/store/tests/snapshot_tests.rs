//! Copying a real store to a log directory.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use fpstore::{
    FingerprintStore, FingerprintStoreEntry, KeyedValue, OpenOptions, VERSION_FILE_NAME,
    copy_store, is_outdated_file,
};
use fpstore_events::MemorySink;
use std::sync::Arc;
use tempfile::TempDir;

fn entry(id: &str) -> FingerprintStoreEntry {
    FingerprintStoreEntry::new(
        id,
        KeyedValue::new(format!("W-{id}"), r#"{"Executable":"/bin/cc"}"#.to_string()),
        KeyedValue::new(format!("S-{id}"), r#"{"ObservedInputs":[]}"#.to_string()),
        KeyedValue::new(format!("H-{id}"), r#"{"Paths":[]}"#.to_string()),
    )
}

#[tokio::test]
async fn test_copied_store_opens_read_only() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("fingerprints");

    let store = FingerprintStore::open(&source, OpenOptions::new()).unwrap();
    for i in 0..50 {
        assert!(store.put_fingerprint_store_entry(&entry(&format!("P{i}")), true));
    }
    store.close().unwrap();

    let destination = tmp.path().join("logs").join("fingerprints");
    let sink = Arc::new(MemorySink::new());
    let report = copy_store(&source, &destination, sink.clone()).await;

    assert_eq!(report.failed, 0, "events: {:?}", sink.events());
    assert!(report.transferred() > 0);
    assert!(destination.join(VERSION_FILE_NAME).exists());
    assert_eq!(sink.count("snapshot.copy_finished"), 1);

    let copy = FingerprintStore::open(&destination, OpenOptions::new().read_only(true)).unwrap();
    assert_eq!(
        copy.try_get_fingerprint_store_entry_by_semi_stable_id("P7"),
        Some(entry("P7"))
    );
}

#[tokio::test]
async fn test_copy_replaces_previous_snapshot() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("fingerprints");
    let destination = tmp.path().join("logs");

    let store = FingerprintStore::open(&source, OpenOptions::new()).unwrap();
    assert!(store.put_content_hash("H1", "{}"));
    store.close().unwrap();
    copy_store(&source, &destination, Arc::new(MemorySink::new())).await;

    let store = FingerprintStore::open(&source, OpenOptions::new()).unwrap();
    assert!(store.put_content_hash("H2", "{}"));
    store.close().unwrap();
    let report = copy_store(&source, &destination, Arc::new(MemorySink::new())).await;
    assert_eq!(report.failed, 0);

    let names: Vec<String> = std::fs::read_dir(&destination)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().all(|name| !is_outdated_file(name)));

    let copy = FingerprintStore::open(&destination, OpenOptions::new().read_only(true)).unwrap();
    assert!(copy.contains_content_hash("H1"));
    assert!(copy.contains_content_hash("H2"));
}

#[tokio::test]
async fn test_copy_into_parent_of_store_is_refused() {
    let tmp = TempDir::new().unwrap();
    let logs = tmp.path().join("logs");
    let source = logs.join("fingerprints");

    let store = FingerprintStore::open(&source, OpenOptions::new()).unwrap();
    assert!(store.put_fingerprint_store_entry(&entry("P1"), true));
    store.close().unwrap();

    let sink = Arc::new(MemorySink::new());
    let report = copy_store(&source, &logs, sink.clone()).await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.transferred(), 0);
    assert_eq!(sink.count("snapshot.copy_failure"), 1);

    let store = FingerprintStore::open(&source, OpenOptions::new().read_only(true)).unwrap();
    assert_eq!(
        store.try_get_fingerprint_store_entry_by_semi_stable_id("P1"),
        Some(entry("P1"))
    );
}
