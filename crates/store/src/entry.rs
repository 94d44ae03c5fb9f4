//! Whole-entry lookups and puts.
//!
//! A [`FingerprintStoreEntry`] is never stored as one record. Its parts live
//! in four columns so path sets shared by many tasks are stored once:
//!
//! ```text
//! Default[id]            -> {WeakFingerprint, StrongFingerprint, PathSet}
//! WeakFingerprints[id]   -> weak inputs
//! StrongFingerprints[id] -> strong inputs
//! ContentHashes[PathSet] -> path-set inputs
//! ```

use crate::accessor::BatchOp;
use crate::codec;
use crate::columns::{Column, ColumnGroup};
use crate::config::FingerprintStoreMode;
use crate::counters::Counter;
use crate::records::PipFingerprintKeys;
use crate::store::FingerprintStore;
use fpstore_events::StorageOperation;
use serde::{Deserialize, Serialize};

/// A value with the key it is known by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedValue<V> {
    /// Lookup key.
    pub key: String,
    /// Value.
    pub value: V,
}

impl<V> KeyedValue<V> {
    /// Pair a key with a value.
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Strong fingerprint inputs and the path set they were computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongFingerprintEntry {
    /// Strong fingerprint → its JSON inputs.
    pub strong_fingerprint_to_inputs: KeyedValue<String>,
    /// Path-set hash → the JSON path set.
    pub path_set_hash_to_inputs: KeyedValue<String>,
}

/// Everything recorded for one task execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintStoreEntry {
    /// Semi-stable id → fingerprint keys.
    pub pip_to_fingerprint_keys: KeyedValue<PipFingerprintKeys>,
    /// Weak fingerprint → its JSON inputs.
    pub weak_fingerprint_to_inputs: KeyedValue<String>,
    /// Strong side of the entry.
    pub strong_fingerprint_entry: StrongFingerprintEntry,
}

impl FingerprintStoreEntry {
    /// Build an entry from its parts; the fingerprint keys are derived from
    /// the keyed values.
    pub fn new(
        semi_stable_id: impl Into<String>,
        weak_fingerprint: KeyedValue<String>,
        strong_fingerprint: KeyedValue<String>,
        path_set: KeyedValue<String>,
    ) -> Self {
        let keys = PipFingerprintKeys::new(
            weak_fingerprint.key.clone(),
            strong_fingerprint.key.clone(),
            path_set.key.clone(),
        );
        Self {
            pip_to_fingerprint_keys: KeyedValue::new(semi_stable_id, keys),
            weak_fingerprint_to_inputs: weak_fingerprint,
            strong_fingerprint_entry: StrongFingerprintEntry {
                strong_fingerprint_to_inputs: strong_fingerprint,
                path_set_hash_to_inputs: path_set,
            },
        }
    }

    /// Semi-stable id of the task.
    #[must_use]
    pub fn semi_stable_id(&self) -> &str {
        &self.pip_to_fingerprint_keys.key
    }

    /// Fingerprint keys of the task.
    #[must_use]
    pub fn keys(&self) -> &PipFingerprintKeys {
        &self.pip_to_fingerprint_keys.value
    }
}

impl FingerprintStore {
    /// Entry for a task, preferring its stable output alias.
    ///
    /// The alias is followed when present and its target entry is complete;
    /// otherwise the lookup falls back to `semi_stable_id`.
    #[must_use]
    pub fn try_get_fingerprint_store_entry(
        &self,
        output_alias: Option<&str>,
        semi_stable_id: &str,
    ) -> Option<FingerprintStoreEntry> {
        if let Some(output_alias) = output_alias {
            let aliased = self.try_get_semi_stable_id_by_output_hash(output_alias);
            if let Some(entry) = aliased
                .as_deref()
                .and_then(|id| self.try_get_fingerprint_store_entry_by_semi_stable_id(id))
            {
                self.counters.increment(Counter::AliasHits);
                return Some(entry);
            }
            self.counters.increment(Counter::AliasFallbacks);
        }
        self.try_get_fingerprint_store_entry_by_semi_stable_id(semi_stable_id)
    }

    /// Entry for a task by semi-stable id; `None` if any part is missing.
    ///
    /// Only a complete entry is renewed.
    #[must_use]
    pub fn try_get_fingerprint_store_entry_by_semi_stable_id(
        &self,
        semi_stable_id: &str,
    ) -> Option<FingerprintStoreEntry> {
        self.counters.increment(Counter::EntryLookups);

        let keys = self.read_pip_fingerprint_keys(semi_stable_id)?;
        let weak_inputs = self.read_text(Column::WeakFingerprints, semi_stable_id)?;
        let strong_inputs = self.read_text(Column::StrongFingerprints, semi_stable_id)?;
        let path_set = self.read_text(Column::ContentHashes, &keys.path_set_hash)?;

        self.track(ColumnGroup::Fingerprints, semi_stable_id);
        self.track(ColumnGroup::ContentHashes, &keys.path_set_hash);
        self.counters.increment(Counter::EntryHits);
        Some(FingerprintStoreEntry {
            weak_fingerprint_to_inputs: KeyedValue::new(keys.weak_fingerprint.clone(), weak_inputs),
            strong_fingerprint_entry: StrongFingerprintEntry {
                strong_fingerprint_to_inputs: KeyedValue::new(
                    keys.strong_fingerprint.clone(),
                    strong_inputs,
                ),
                path_set_hash_to_inputs: KeyedValue::new(keys.path_set_hash.clone(), path_set),
            },
            pip_to_fingerprint_keys: KeyedValue::new(semi_stable_id, keys),
        })
    }

    /// Write an entry in one batch.
    ///
    /// The path set is written only when `store_path_set` is set; callers skip
    /// it when the hash is already stored. In [`FingerprintStoreMode::Default`]
    /// an entry whose stored keys already match is left alone and only renewed.
    ///
    /// Returns whether the entry is stored afterwards.
    pub fn put_fingerprint_store_entry(
        &self,
        entry: &FingerprintStoreEntry,
        store_path_set: bool,
    ) -> bool {
        let id = entry.semi_stable_id();
        let path_set = &entry.strong_fingerprint_entry.path_set_hash_to_inputs;

        if self.options.mode == FingerprintStoreMode::Default
            && self.is_unchanged(entry, store_path_set)
        {
            self.counters.increment(Counter::EntriesSkipped);
            self.track(ColumnGroup::Fingerprints, id);
            self.track(ColumnGroup::ContentHashes, &path_set.key);
            return true;
        }

        let keys_json = match codec::encode_pip_fingerprint_keys(entry.keys()) {
            Ok(json) => json,
            Err(err) => {
                self.storage_failure(StorageOperation::WriteBatch, Column::Default, id, &err);
                return false;
            }
        };

        let mut ops = vec![
            BatchOp::Put {
                column: Column::Default,
                key: id,
                value: keys_json.as_bytes(),
            },
            BatchOp::Put {
                column: Column::WeakFingerprints,
                key: id,
                value: entry.weak_fingerprint_to_inputs.value.as_bytes(),
            },
            BatchOp::Put {
                column: Column::StrongFingerprints,
                key: id,
                value: entry
                    .strong_fingerprint_entry
                    .strong_fingerprint_to_inputs
                    .value
                    .as_bytes(),
            },
        ];
        if store_path_set {
            ops.push(BatchOp::Put {
                column: Column::ContentHashes,
                key: &path_set.key,
                value: path_set.value.as_bytes(),
            });
        }

        if !self.write_batch(&ops) {
            return false;
        }

        self.counters.increment(Counter::EntriesPut);
        if store_path_set {
            self.counters.increment(Counter::PathSetsPut);
        }
        self.track(ColumnGroup::Fingerprints, id);
        self.track(ColumnGroup::ContentHashes, &path_set.key);
        true
    }

    /// Delete the default, weak and strong rows for `semi_stable_id`.
    ///
    /// Shared path sets and aliases are left for garbage collection.
    pub fn remove_fingerprint_store_entry(&self, semi_stable_id: &str) -> bool {
        let ops: Vec<_> = ColumnGroup::Fingerprints
            .siblings()
            .iter()
            .chain(std::iter::once(&Column::Default))
            .map(|&column| BatchOp::Remove {
                column,
                key: semi_stable_id,
            })
            .collect();
        self.write_batch(&ops)
    }

    /// Whether every column this put would write already holds the entry's
    /// keys. Inputs are not compared: equal fingerprints imply equal inputs.
    fn is_unchanged(&self, entry: &FingerprintStoreEntry, store_path_set: bool) -> bool {
        let id = entry.semi_stable_id();
        let Some(stored) = self
            .read(Column::Default, id)
            .and_then(|bytes| codec::decode_pip_fingerprint_keys(&bytes).ok())
        else {
            return false;
        };

        stored == *entry.keys()
            && self.contains(Column::WeakFingerprints, id)
            && self.contains(Column::StrongFingerprints, id)
            && (!store_path_set
                || self.contains(
                    Column::ContentHashes,
                    &entry.strong_fingerprint_entry.path_set_hash_to_inputs.key,
                ))
    }

    fn contains(&self, column: Column, key: &str) -> bool {
        match self.accessor.contains(column, key) {
            Ok(found) => found,
            Err(err) => {
                self.storage_failure(StorageOperation::Contains, column, key, &err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenOptions;
    use tempfile::TempDir;

    fn entry(id: &str, weak: &str, strong: &str, path_set: &str) -> FingerprintStoreEntry {
        FingerprintStoreEntry::new(
            id,
            KeyedValue::new(weak, format!(r#"{{"weak":"{weak}"}}"#)),
            KeyedValue::new(strong, format!(r#"{{"strong":"{strong}"}}"#)),
            KeyedValue::new(path_set, format!(r#"{{"paths":["{path_set}"]}}"#)),
        )
    }

    fn open(path: &std::path::Path, mode: FingerprintStoreMode) -> FingerprintStore {
        FingerprintStore::open(path, OpenOptions::new().mode(mode)).unwrap()
    }

    #[test]
    fn test_entry_new_derives_keys() {
        let e = entry("P1", "W1", "S1", "H1");
        assert_eq!(e.semi_stable_id(), "P1");
        assert_eq!(e.keys(), &PipFingerprintKeys::new("W1", "S1", "H1"));
    }

    #[test]
    fn test_put_then_get_entry() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path(), FingerprintStoreMode::Default);
        let e = entry("P1", "W1", "S1", "H1");

        assert!(store.put_fingerprint_store_entry(&e, true));
        assert_eq!(
            store.try_get_fingerprint_store_entry_by_semi_stable_id("P1"),
            Some(e)
        );
        assert_eq!(store.counters()["entries_put"], 1);
        assert_eq!(store.counters()["entry_hits"], 1);
    }

    #[test]
    fn test_without_path_set_entry_is_incomplete() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path(), FingerprintStoreMode::Default);

        assert!(store.put_fingerprint_store_entry(&entry("P1", "W1", "S1", "H1"), false));
        assert_eq!(store.try_get_fingerprint_store_entry_by_semi_stable_id("P1"), None);
        assert!(store.try_get_pip_fingerprint_keys("P1").is_some());
    }

    #[test]
    fn test_incomplete_entry_lookup_does_not_renew() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path(), FingerprintStoreMode::Default);
        assert!(store.put_fingerprint_store_entry(&entry("P1", "W1", "S1", "H1"), false));
        assert!(store.put_fingerprint_store_entry(&entry("P2", "W2", "S2", "H2"), true));
        store.close().unwrap();

        let store = open(tmp.path(), FingerprintStoreMode::Default);
        assert_eq!(store.try_get_fingerprint_store_entry_by_semi_stable_id("P1"), None);
        assert!(!store.tracker.contains(ColumnGroup::Fingerprints, "P1"));
        assert!(!store.tracker.contains(ColumnGroup::ContentHashes, "H1"));

        assert!(store.try_get_fingerprint_store_entry_by_semi_stable_id("P2").is_some());
        assert!(store.tracker.contains(ColumnGroup::Fingerprints, "P2"));
        assert!(store.tracker.contains(ColumnGroup::ContentHashes, "H2"));
    }

    #[test]
    fn test_default_mode_skips_unchanged_entry() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path(), FingerprintStoreMode::Default);
        let e = entry("P1", "W1", "S1", "H1");

        assert!(store.put_fingerprint_store_entry(&e, true));
        assert!(store.put_fingerprint_store_entry(&e, true));
        assert_eq!(store.counters()["entries_put"], 1);
        assert_eq!(store.counters()["entries_skipped"], 1);

        // A new strong fingerprint is a change.
        assert!(store.put_fingerprint_store_entry(&entry("P1", "W1", "S2", "H1"), true));
        assert_eq!(store.counters()["entries_put"], 2);
    }

    #[test]
    fn test_ignore_existing_entries_always_rewrites() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path(), FingerprintStoreMode::IgnoreExistingEntries);
        let e = entry("P1", "W1", "S1", "H1");

        assert!(store.put_fingerprint_store_entry(&e, true));
        assert!(store.put_fingerprint_store_entry(&e, true));
        assert_eq!(store.counters()["entries_put"], 2);
        assert_eq!(store.counters()["entries_skipped"], 0);
    }

    #[test]
    fn test_remove_entry_keeps_path_set() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path(), FingerprintStoreMode::Default);
        assert!(store.put_fingerprint_store_entry(&entry("P1", "W1", "S1", "H1"), true));

        assert!(store.remove_fingerprint_store_entry("P1"));
        assert_eq!(store.try_get_pip_fingerprint_keys("P1"), None);
        assert_eq!(store.try_get_weak_fingerprint_inputs("P1"), None);
        assert_eq!(store.try_get_strong_fingerprint_inputs("P1"), None);
        assert!(store.contains_content_hash("H1"));
    }

    #[test]
    fn test_alias_is_preferred_over_semi_stable_id() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path(), FingerprintStoreMode::Default);
        let old = entry("P-old", "W1", "S1", "H1");
        let new = entry("P-new", "W2", "S2", "H2");
        assert!(store.put_fingerprint_store_entry(&old, true));
        assert!(store.put_fingerprint_store_entry(&new, true));
        assert!(store.put_pip_unique_output_hash("O1", "P-old"));

        assert_eq!(
            store.try_get_fingerprint_store_entry(Some("O1"), "P-new"),
            Some(old)
        );
        assert_eq!(store.counters()["alias_hits"], 1);
    }

    #[test]
    fn test_alias_to_missing_target_falls_back() {
        let tmp = TempDir::new().unwrap();
        let store = open(tmp.path(), FingerprintStoreMode::Default);
        let e = entry("P1", "W1", "S1", "H1");
        assert!(store.put_fingerprint_store_entry(&e, true));
        assert!(store.put_pip_unique_output_hash("O1", "P-gone"));

        assert_eq!(store.try_get_fingerprint_store_entry(Some("O1"), "P1"), Some(e));
        assert_eq!(store.counters()["alias_fallbacks"], 1);
    }
}
