//! Integration tests for opening, reading and writing a fingerprint store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use fpstore::{
    Column, Error, FORMAT_VERSION, FingerprintStore, FingerprintStoreEntry, KeyValueAccessor,
    KeyedValue, OpenOptions, PipFingerprintKeys, VERSION_FILE_NAME,
};
use rayon::prelude::*;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn entry(id: &str, weak: &str, strong: &str, path_set: &str) -> FingerprintStoreEntry {
    FingerprintStoreEntry::new(
        id,
        KeyedValue::new(weak, format!(r#"{{"Executable":"/bin/{weak}"}}"#)),
        KeyedValue::new(strong, format!(r#"{{"ObservedInputs":["{strong}"]}}"#)),
        KeyedValue::new(path_set, format!(r#"{{"Paths":["/src/{path_set}"]}}"#)),
    )
}

fn open(path: &Path) -> FingerprintStore {
    FingerprintStore::open(path, OpenOptions::new()).unwrap()
}

fn open_read_only(path: &Path) -> FingerprintStore {
    FingerprintStore::open(path, OpenOptions::new().read_only(true)).unwrap()
}

/// Edit a closed store underneath the façade.
fn with_raw_store(path: &Path, edit: impl FnOnce(&KeyValueAccessor)) {
    let (accessor, _) = KeyValueAccessor::open(path, FORMAT_VERSION, false).unwrap();
    edit(&accessor);
}

#[test]
fn test_entry_persists_and_reopens_read_only() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("fingerprints");
    let expected = entry("P1", "W1", "S1", "H1");

    let store = FingerprintStore::open(
        &path,
        OpenOptions::new().max_entry_age(Duration::from_secs(3600)),
    )
    .unwrap();
    assert!(store.put_fingerprint_store_entry(&expected, true));

    let found = store
        .try_get_fingerprint_store_entry_by_semi_stable_id("P1")
        .unwrap();
    assert_eq!(found.keys(), &PipFingerprintKeys::new("W1", "S1", "H1"));
    assert_eq!(found, expected);
    store.close().unwrap();

    let store = open_read_only(&path);
    assert!(store.is_read_only());
    assert_eq!(
        store.try_get_fingerprint_store_entry_by_semi_stable_id("P1"),
        Some(expected)
    );
}

#[test]
fn test_pip_fingerprint_keys_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let store = open(tmp.path());
    assert!(store.put_fingerprint_store_entry(&entry("P7", "weak-7", "strong-7", "ps-7"), false));

    assert_eq!(
        store.try_get_pip_fingerprint_keys("P7"),
        Some(PipFingerprintKeys::new("weak-7", "strong-7", "ps-7"))
    );
    assert_eq!(store.try_get_pip_fingerprint_keys("P8"), None);
}

#[test]
fn test_content_hash_last_write_wins() {
    let tmp = TempDir::new().unwrap();
    let store = open(tmp.path());

    assert!(store.put_content_hash("H1", r#"{"v":1}"#));
    assert!(store.put_content_hash("H1", r#"{"v":2}"#));
    assert_eq!(
        store.try_get_content_hash_value("H1").as_deref(),
        Some(r#"{"v":2}"#)
    );
}

#[test]
fn test_alias_fallback_after_alias_deleted() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("fingerprints");
    let expected = entry("P1", "W1", "S1", "H1");

    let store = open(&path);
    assert!(store.put_fingerprint_store_entry(&expected, true));
    assert!(store.put_pip_unique_output_hash("O1", "P1"));
    assert_eq!(
        store.try_get_fingerprint_store_entry(Some("O1"), "P1"),
        Some(expected.clone())
    );
    store.close().unwrap();

    with_raw_store(&path, |raw| {
        raw.remove(Column::OutputIdentifierAlias, "O1").unwrap();
    });

    let store = open(&path);
    assert_eq!(store.try_get_semi_stable_id_by_output_hash("O1"), None);
    assert_eq!(
        store.try_get_fingerprint_store_entry(Some("O1"), "P1"),
        Some(expected)
    );
    assert_eq!(store.counters()["alias_fallbacks"], 1);
}

#[test]
fn test_partial_entry_is_not_returned() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("fingerprints");

    let store = open(&path);
    assert!(store.put_fingerprint_store_entry(&entry("P1", "W1", "S1", "H1"), true));
    store.close().unwrap();

    with_raw_store(&path, |raw| {
        raw.remove(Column::WeakFingerprints, "P1").unwrap();
    });

    let store = open_read_only(&path);
    assert!(store.try_get_pip_fingerprint_keys("P1").is_some());
    assert_eq!(store.try_get_fingerprint_store_entry_by_semi_stable_id("P1"), None);
    assert_eq!(store.try_get_fingerprint_store_entry(None, "P1"), None);
}

#[test]
fn test_concurrent_puts_are_all_retrievable() {
    const ENTRIES: usize = 1000;

    let tmp = TempDir::new().unwrap();
    let store = open(tmp.path());

    (0..ENTRIES).into_par_iter().for_each(|n| {
        // Path sets are shared between neighbouring tasks.
        let e = entry(
            &format!("P{n}"),
            &format!("W{n}"),
            &format!("S{n}"),
            &format!("H{}", n / 4),
        );
        assert!(store.put_fingerprint_store_entry(&e, true));
    });

    for n in 0..ENTRIES {
        let found = store
            .try_get_fingerprint_store_entry_by_semi_stable_id(&format!("P{n}"))
            .unwrap_or_else(|| panic!("P{n} missing"));
        assert_eq!(found.keys().strong_fingerprint, format!("S{n}"));
    }
    assert_eq!(store.counters()["entries_put"], ENTRIES as u64);
    store.close().unwrap();
}

#[test]
fn test_read_only_open_without_store_fails() {
    let tmp = TempDir::new().unwrap();
    let err = FingerprintStore::open(
        tmp.path().join("missing"),
        OpenOptions::new().read_only(true),
    )
    .unwrap_err();
    assert!(matches!(err, Error::StoreNotFound { .. }));
}

#[test]
fn test_version_mismatch_recreates_store() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("fingerprints");

    let store = open(&path);
    assert!(store.put_content_hash("H1", "{}"));
    store.close().unwrap();

    std::fs::write(path.join(VERSION_FILE_NAME), "999\n").unwrap();

    // Read-only tolerates the foreign version.
    let store = open_read_only(&path);
    assert!(store.contains_content_hash("H1"));
    store.close().unwrap();

    // Read-write starts over.
    let store = open(&path);
    assert!(!store.contains_content_hash("H1"));
    store.close().unwrap();
    assert_eq!(
        std::fs::read_to_string(path.join(VERSION_FILE_NAME)).unwrap().trim(),
        FORMAT_VERSION.to_string()
    );
}

#[test]
fn test_missing_column_is_created_for_read_only_session() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("fingerprints");

    {
        let mut options = rocksdb::Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);
        let db = rocksdb::DB::open_cf(&options, &path, ["default", "content_hashes"]).unwrap();
        let cf = db.cf_handle("content_hashes").unwrap();
        db.put_cf(cf, "H1", r#"{"old":true}"#).unwrap();
    }
    std::fs::write(path.join(VERSION_FILE_NAME), format!("{FORMAT_VERSION}\n")).unwrap();

    let store = open_read_only(&path);
    assert!(store.is_read_only());
    assert_eq!(
        store.try_get_content_hash_value("H1").as_deref(),
        Some(r#"{"old":true}"#)
    );
    assert!(!store.put_pip_unique_output_hash("O1", "P1"));
    assert!(store.close().unwrap().columns.is_empty());

    let (accessor, outcome) = KeyValueAccessor::open(&path, FORMAT_VERSION, true).unwrap();
    assert!(outcome.read_only);
    assert!(outcome.added_columns.is_empty());
    assert_eq!(accessor.get(Column::OutputIdentifierAlias, "O1").unwrap(), None);
    assert!(accessor.contains(Column::ContentHashes, "H1").unwrap());
}

#[test]
fn test_checkpoint_of_live_store() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp.path().join("live"));
    assert!(store.put_fingerprint_store_entry(&entry("P1", "W1", "S1", "H1"), true));

    let checkpoint = tmp.path().join("checkpoint");
    store.checkpoint(&checkpoint).unwrap();
    assert!(store.put_content_hash("after", "{}"));
    store.close().unwrap();

    let copy = open_read_only(&checkpoint);
    assert!(copy.try_get_fingerprint_store_entry_by_semi_stable_id("P1").is_some());
    assert!(!copy.contains_content_hash("after"));
}

#[test]
fn test_keys_excludes_metadata() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("fingerprints");

    let store = open(&path);
    assert!(store.put_fingerprint_store_entry(&entry("P1", "W1", "S1", "H1"), true));
    assert!(store.put_fingerprint_store_entry(&entry("P2", "W2", "S2", "H1"), false));
    store.close().unwrap();

    // The close above wrote an LRU map into the default column.
    let store = open_read_only(&path);
    assert_eq!(store.keys(Column::Default).unwrap(), vec!["P1", "P2"]);
    assert_eq!(store.keys(Column::ContentHashes).unwrap(), vec!["H1"]);
}
