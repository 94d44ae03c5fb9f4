//! Garbage-collected fingerprint store for build orchestrators
//!
//! This crate persists per-task fingerprint data build over build:
//! - Fingerprint keys, weak inputs and strong inputs per task
//! - Content-addressed path sets shared by many tasks
//! - Stable output hashes aliasing a task's semi-stable id
//! - The cache-miss list of the last build
//!
//! # Overview
//!
//! A [`FingerprintStore`] wraps a RocksDB directory with five column
//! families. Entries are read and written concurrently during a build. At
//! close, keys touched during the session have their age renewed and keys
//! untouched for longer than the max entry age are evicted, within a
//! wall-clock budget.
//!
//! ```rust,ignore
//! use fpstore::{FingerprintStore, OpenOptions};
//!
//! let store = FingerprintStore::open("/var/cache/fp", OpenOptions::new())?;
//! if let Some(entry) = store.try_get_fingerprint_store_entry(Some(output_hash), id) {
//!     // compare against freshly computed fingerprints
//! }
//! store.put_fingerprint_store_entry(&entry, !store.contains_content_hash(path_set_hash));
//! let report = store.close()?;
//! ```
//!
//! # Snapshots
//!
//! [`copy_store`] mirrors a store directory for offline analysis, cloning or
//! hard-linking immutable table files where possible.
//! [`FingerprintStore::checkpoint`] takes a consistent copy of a live store.

mod accessor;
mod budget;
pub mod clock;
pub mod codec;
pub mod columns;
pub mod config;
mod counters;
mod entry;
mod error;
mod gc;
pub mod json;
mod lru;
mod records;
mod snapshot;
mod store;

pub use accessor::{BatchOp, GarbageCollectResult, KeyValueAccessor, OpenOutcome, VERSION_FILE_NAME};
pub use budget::TimeBudget;
pub use clock::{Clock, ManualClock, SystemClock};
pub use columns::{Column, ColumnGroup};
pub use config::{
    DEFAULT_GC_BUDGET, DEFAULT_MAX_ENTRY_AGE, FingerprintStoreConfig, FingerprintStoreMode,
    OpenOptions,
};
pub use counters::{Counter, StoreCounters};
pub use entry::{FingerprintStoreEntry, KeyedValue, StrongFingerprintEntry};
pub use error::{Error, Result};
pub use gc::{ColumnGcReport, GcReport};
pub use json::{FingerprintInputs, JsonTreeWriter, render_inputs};
pub use lru::{LruEntriesMap, LruEntryTracker};
pub use records::{CacheMissInfo, CacheMissKind, PipFingerprintKeys};
pub use snapshot::{CopyReport, copy_store, is_outdated_file, is_storage_file};
pub use store::{FORMAT_VERSION, FingerprintStore};
