//! The fingerprint store façade.
//!
//! A [`FingerprintStore`] is opened once per build session. Lookups and puts
//! may come from any number of threads; single-key engine failures are
//! reported to the event sink and degrade to "not found" or "not written".
//! Closing a read-write store runs garbage collection (see [`crate::gc`]).

use crate::accessor::{BatchOp, KeyValueAccessor};
use crate::codec;
use crate::columns::{CACHE_MISS_LIST_KEY, Column, ColumnGroup, is_metadata_key};
use crate::config::{FingerprintStoreMode, OpenOptions};
use crate::counters::{Counter, StoreCounters};
use crate::gc::GcReport;
use crate::lru::LruEntryTracker;
use crate::records::{CacheMissInfo, PipFingerprintKeys};
use crate::{Error, Result};
use fpstore_events::{
    CorruptRecord, StorageFailure, StorageOperation, StoreClosed, StoreEvent, StoreOpened,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// On-disk format version. Bump when a column's encoding changes; read-write
/// opens of a store with another version start from scratch.
pub const FORMAT_VERSION: u32 = 1;

/// Persistent fingerprint store for one build session.
#[derive(Debug)]
pub struct FingerprintStore {
    pub(crate) accessor: KeyValueAccessor,
    pub(crate) options: OpenOptions,
    pub(crate) tracker: LruEntryTracker,
    pub(crate) counters: Arc<StoreCounters>,
    disposed: bool,
}

impl FingerprintStore {
    /// Open or create the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreNotFound`] for a read-only open of a directory
    /// without a store, and I/O or engine errors when the store cannot be
    /// opened.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let (accessor, outcome) =
            KeyValueAccessor::open(path, FORMAT_VERSION, options.read_only)?;

        options.sink.emit(&StoreEvent::Opened(StoreOpened {
            path: path.display().to_string(),
            read_only: outcome.read_only,
            created: outcome.created,
            version_reset: outcome.version_reset,
            added_columns: outcome.added_columns,
        }));

        Ok(Self {
            accessor,
            options,
            tracker: LruEntryTracker::new(),
            counters: Arc::new(StoreCounters::new()),
            disposed: false,
        })
    }

    /// Store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.accessor.path()
    }

    /// Whether this session was opened read-only.
    ///
    /// A store missing a column is opened read-write by the engine so the
    /// column can be created, but a read-only session still tracks nothing,
    /// writes nothing and skips garbage collection.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    /// Put behavior for existing entries.
    #[must_use]
    pub fn mode(&self) -> FingerprintStoreMode {
        self.options.mode
    }

    /// Snapshot of this store's counters.
    #[must_use]
    pub fn counters(&self) -> BTreeMap<&'static str, u64> {
        self.counters.snapshot()
    }

    // ------------------------------------------------------------------
    // Single-column lookups
    // ------------------------------------------------------------------

    /// Fingerprint keys recorded for `semi_stable_id`.
    ///
    /// On success the id and its path-set hash are both touched.
    #[must_use]
    pub fn try_get_pip_fingerprint_keys(
        &self,
        semi_stable_id: &str,
    ) -> Option<PipFingerprintKeys> {
        let keys = self.read_pip_fingerprint_keys(semi_stable_id)?;
        self.track(ColumnGroup::Fingerprints, semi_stable_id);
        self.track(ColumnGroup::ContentHashes, &keys.path_set_hash);
        Some(keys)
    }

    pub(crate) fn read_pip_fingerprint_keys(
        &self,
        semi_stable_id: &str,
    ) -> Option<PipFingerprintKeys> {
        let bytes = self.read(Column::Default, semi_stable_id)?;
        self.decode(
            Column::Default,
            semi_stable_id,
            codec::decode_pip_fingerprint_keys(&bytes),
        )
    }

    /// Weak fingerprint inputs recorded for `semi_stable_id`.
    #[must_use]
    pub fn try_get_weak_fingerprint_inputs(&self, semi_stable_id: &str) -> Option<String> {
        let value = self.read_text(Column::WeakFingerprints, semi_stable_id)?;
        self.track(ColumnGroup::Fingerprints, semi_stable_id);
        Some(value)
    }

    /// Strong fingerprint inputs recorded for `semi_stable_id`.
    #[must_use]
    pub fn try_get_strong_fingerprint_inputs(&self, semi_stable_id: &str) -> Option<String> {
        let value = self.read_text(Column::StrongFingerprints, semi_stable_id)?;
        self.track(ColumnGroup::Fingerprints, semi_stable_id);
        Some(value)
    }

    /// Inputs stored under a content hash.
    #[must_use]
    pub fn try_get_content_hash_value(&self, content_hash: &str) -> Option<String> {
        let value = self.read_text(Column::ContentHashes, content_hash)?;
        self.track(ColumnGroup::ContentHashes, content_hash);
        Some(value)
    }

    /// Semi-stable id aliased by a stable output hash.
    #[must_use]
    pub fn try_get_semi_stable_id_by_output_hash(&self, output_hash: &str) -> Option<String> {
        let value = self.read_text(Column::OutputIdentifierAlias, output_hash)?;
        self.track(ColumnGroup::OutputAliases, output_hash);
        Some(value)
    }

    /// Whether `content_hash` is stored. Does not renew it.
    #[must_use]
    pub fn contains_content_hash(&self, content_hash: &str) -> bool {
        match self.accessor.contains(Column::ContentHashes, content_hash) {
            Ok(found) => found,
            Err(err) => {
                self.storage_failure(
                    StorageOperation::Contains,
                    Column::ContentHashes,
                    content_hash,
                    &err,
                );
                false
            }
        }
    }

    /// Cache misses recorded for the last build.
    #[must_use]
    pub fn try_get_cache_miss_list(&self) -> Option<Vec<CacheMissInfo>> {
        let bytes = self.read(Column::Default, CACHE_MISS_LIST_KEY)?;
        self.decode(
            Column::Default,
            CACHE_MISS_LIST_KEY,
            codec::decode_cache_miss_list(&bytes),
        )
    }

    // ------------------------------------------------------------------
    // Single-column puts
    // ------------------------------------------------------------------

    /// Store inputs under a content hash. Returns whether it was written.
    pub fn put_content_hash(&self, content_hash: &str, inputs: &str) -> bool {
        if !self.write(Column::ContentHashes, content_hash, inputs.as_bytes()) {
            return false;
        }
        self.counters.increment(Counter::ContentHashesPut);
        self.track(ColumnGroup::ContentHashes, content_hash);
        true
    }

    /// Alias `output_hash` to `semi_stable_id`. Returns whether it was written.
    pub fn put_pip_unique_output_hash(&self, output_hash: &str, semi_stable_id: &str) -> bool {
        let alias = semi_stable_id.as_bytes();
        if !self.write(Column::OutputIdentifierAlias, output_hash, alias) {
            return false;
        }
        self.counters.increment(Counter::OutputAliasesPut);
        self.track(ColumnGroup::OutputAliases, output_hash);
        true
    }

    /// Replace the cache-miss list. Returns whether it was written.
    pub fn put_cache_miss_list(&self, list: &[CacheMissInfo]) -> bool {
        let bytes = match codec::encode_cache_miss_list(list) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.storage_failure(
                    StorageOperation::Put,
                    Column::Default,
                    CACHE_MISS_LIST_KEY,
                    &err,
                );
                return false;
            }
        };
        self.write(Column::Default, CACHE_MISS_LIST_KEY, &bytes)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// User keys in `column`, without metadata keys.
    ///
    /// # Errors
    ///
    /// Returns an engine error if iteration fails.
    pub fn keys(&self, column: Column) -> Result<Vec<String>> {
        let mut keys = self.accessor.keys(column)?;
        keys.retain(|key| !is_metadata_key(key));
        Ok(keys)
    }

    /// Engine estimate of the number of keys in `column`.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the estimate is unavailable.
    pub fn estimate_num_keys(&self, column: Column) -> Result<u64> {
        self.accessor.estimate_num_keys(column)
    }

    /// Write a consistent copy of the live store to `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is read-only, `dir` is not empty, or the
    /// engine checkpoint fails.
    pub fn checkpoint(&self, dir: impl AsRef<Path>) -> Result<()> {
        self.accessor.checkpoint(dir.as_ref())
    }

    /// Collect garbage (read-write only) and close.
    ///
    /// Returns the collection report; read-only stores return an empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if garbage collection or the final flush fails.
    pub fn close(mut self) -> Result<GcReport> {
        Ok(self.dispose()?.unwrap_or_default())
    }

    /// Runs at most once; later calls return `Ok(None)`.
    fn dispose(&mut self) -> Result<Option<GcReport>> {
        if self.disposed {
            return Ok(None);
        }
        self.disposed = true;

        let started = Instant::now();
        let report = if self.is_read_only() {
            None
        } else {
            Some(self.collect_garbage()?)
        };
        self.accessor.flush()?;

        self.options.sink.emit(&StoreEvent::Closed(StoreClosed {
            path: self.path().display().to_string(),
            garbage_collected: report.is_some(),
            duration_ms: duration_ms(started),
        }));
        Ok(Some(report.unwrap_or_default()))
    }

    // ------------------------------------------------------------------
    // Best-effort engine access
    // ------------------------------------------------------------------

    pub(crate) fn track(&self, group: ColumnGroup, key: &str) {
        if !self.is_read_only() {
            self.tracker.track(group, key);
        }
    }

    pub(crate) fn read(&self, column: Column, key: &str) -> Option<Vec<u8>> {
        match self.accessor.get(column, key) {
            Ok(value) => value,
            Err(err) => {
                self.storage_failure(StorageOperation::Get, column, key, &err);
                None
            }
        }
    }

    pub(crate) fn read_text(&self, column: Column, key: &str) -> Option<String> {
        let bytes = self.read(column, key)?;
        self.decode(
            column,
            key,
            String::from_utf8(bytes).map_err(|e| Error::codec(e.to_string())),
        )
    }

    pub(crate) fn write(&self, column: Column, key: &str, value: &[u8]) -> bool {
        self.write_batch(&[BatchOp::Put { column, key, value }])
    }

    pub(crate) fn write_batch(&self, ops: &[BatchOp<'_>]) -> bool {
        let result = if self.is_read_only() {
            Err(Error::configuration("store is read-only"))
        } else {
            self.accessor.write_batch(ops)
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                let (operation, column, key) = describe_batch(ops);
                self.storage_failure(operation, column, key, &err);
                false
            }
        }
    }

    pub(crate) fn decode<T>(&self, column: Column, key: &str, decoded: Result<T>) -> Option<T> {
        match decoded {
            Ok(value) => Some(value),
            Err(err) => {
                self.counters.increment(Counter::CorruptRecords);
                self.options.sink.emit(&StoreEvent::CorruptRecord(CorruptRecord {
                    column: column.to_string(),
                    key: key.to_owned(),
                    message: err.to_string(),
                }));
                None
            }
        }
    }

    pub(crate) fn storage_failure(
        &self,
        operation: StorageOperation,
        column: Column,
        key: &str,
        err: &Error,
    ) {
        self.counters.increment(Counter::StorageFailures);
        self.options.sink.emit(&StoreEvent::StorageFailure(StorageFailure {
            operation,
            column: column.to_string(),
            key: key.to_owned(),
            message: err.to_string(),
        }));
    }
}

impl Drop for FingerprintStore {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            tracing::error!(
                target: "fpstore::store",
                path = %self.path().display(),
                error = %err,
                "Failed to close fingerprint store"
            );
        }
    }
}

/// Event fields for a failed batch: a single op is reported as itself.
fn describe_batch<'a>(ops: &[BatchOp<'a>]) -> (StorageOperation, Column, &'a str) {
    match ops {
        [BatchOp::Put { column, key, .. }] => (StorageOperation::Put, *column, *key),
        [BatchOp::Remove { column, key }] => (StorageOperation::Remove, *column, *key),
        [BatchOp::Put { column, key, .. } | BatchOp::Remove { column, key }, ..] => {
            (StorageOperation::WriteBatch, *column, *key)
        }
        [] => (StorageOperation::WriteBatch, Column::Default, ""),
    }
}

pub(crate) fn duration_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::CacheMissKind;
    use fpstore_events::MemorySink;
    use tempfile::TempDir;

    fn open_with_sink(path: &Path, read_only: bool) -> (FingerprintStore, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let store = FingerprintStore::open(
            path,
            OpenOptions::new()
                .read_only(read_only)
                .event_sink(sink.clone()),
        )
        .unwrap();
        (store, sink)
    }

    #[test]
    fn test_open_emits_opened_event() {
        let tmp = TempDir::new().unwrap();
        let (store, sink) = open_with_sink(&tmp.path().join("fp"), false);
        assert!(!store.is_read_only());
        assert_eq!(sink.count("store.opened"), 1);
        store.close().unwrap();
        assert_eq!(sink.count("store.closed"), 1);
    }

    #[test]
    fn test_content_hash_put_get() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open_with_sink(&tmp.path().join("fp"), false);

        assert!(!store.contains_content_hash("H1"));
        assert!(store.put_content_hash("H1", r#"{"paths":[]}"#));
        assert!(store.contains_content_hash("H1"));
        assert_eq!(
            store.try_get_content_hash_value("H1").as_deref(),
            Some(r#"{"paths":[]}"#)
        );
        assert_eq!(store.counters()["content_hashes_put"], 1);
    }

    #[test]
    fn test_output_alias_put_get() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open_with_sink(&tmp.path().join("fp"), false);

        assert!(store.put_pip_unique_output_hash("O1", "P1"));
        assert_eq!(
            store.try_get_semi_stable_id_by_output_hash("O1").as_deref(),
            Some("P1")
        );
        assert_eq!(store.try_get_semi_stable_id_by_output_hash("O2"), None);
    }

    #[test]
    fn test_cache_miss_list_is_replaced_wholesale() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = open_with_sink(&tmp.path().join("fp"), false);
        assert_eq!(store.try_get_cache_miss_list(), None);

        let first = vec![
            CacheMissInfo::new(1, CacheMissKind::MissForCacheEntry),
            CacheMissInfo::new(2, CacheMissKind::Hit),
        ];
        assert!(store.put_cache_miss_list(&first));
        let second = vec![CacheMissInfo::new(9, CacheMissKind::MissForProcessMetadata)];
        assert!(store.put_cache_miss_list(&second));

        assert_eq!(store.try_get_cache_miss_list(), Some(second));
        assert!(store.keys(Column::Default).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_keys_record_is_reported() {
        let tmp = TempDir::new().unwrap();
        let (store, sink) = open_with_sink(&tmp.path().join("fp"), false);
        store.accessor.put(Column::Default, "P1", b"not json").unwrap();

        assert_eq!(store.try_get_pip_fingerprint_keys("P1"), None);
        assert_eq!(sink.count("store.corrupt_record"), 1);
        assert_eq!(store.counters()["corrupt_records"], 1);
    }

    #[test]
    fn test_read_only_rejects_puts() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fp");
        open_with_sink(&path, false).0.close().unwrap();

        let (store, sink) = open_with_sink(&path, true);
        assert!(store.is_read_only());
        assert!(!store.put_content_hash("H1", "{}"));
        assert_eq!(sink.count("store.storage_failure"), 1);
        assert_eq!(store.try_get_content_hash_value("H1"), None);
        let report = store.close().unwrap();
        assert!(report.columns.is_empty());
    }

    #[test]
    fn test_drop_disposes_once() {
        let tmp = TempDir::new().unwrap();
        let (store, sink) = open_with_sink(&tmp.path().join("fp"), false);
        drop(store);
        assert_eq!(sink.count("store.closed"), 1);
    }

    #[test]
    fn test_describe_batch() {
        let single = [BatchOp::Remove {
            column: Column::WeakFingerprints,
            key: "P1",
        }];
        assert_eq!(
            describe_batch(&single),
            (StorageOperation::Remove, Column::WeakFingerprints, "P1")
        );

        let many = [
            BatchOp::Put {
                column: Column::Default,
                key: "P1",
                value: b"",
            },
            BatchOp::Put {
                column: Column::StrongFingerprints,
                key: "P1",
                value: b"",
            },
        ];
        assert_eq!(
            describe_batch(&many),
            (StorageOperation::WriteBatch, Column::Default, "P1")
        );
    }
}
