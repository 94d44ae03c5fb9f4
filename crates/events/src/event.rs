//! Event record definitions for the fingerprint store.
//!
//! Every event is a plain data record. Records are grouped under [`StoreEvent`]
//! so a sink can handle them uniformly or match on the ones it cares about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A store event together with the time it was recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// The event itself.
    pub event: StoreEvent,
}

impl TimestampedEvent {
    /// Stamp an event with the current time.
    #[must_use]
    pub fn now(event: StoreEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All events the fingerprint store reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StoreEvent {
    /// A store was opened.
    Opened(StoreOpened),
    /// A single-key engine operation failed and was degraded to a no-op.
    StorageFailure(StorageFailure),
    /// A stored record could not be decoded.
    CorruptRecord(CorruptRecord),
    /// Garbage collection finished (or was canceled) for one column.
    ColumnCollected(ColumnCollected),
    /// A store was closed.
    Closed(StoreClosed),
    /// A file could not be copied while snapshotting a store.
    CopyFailure(CopyFailure),
    /// Hard links stopped being attempted for the rest of a copy.
    HardLinksDisabled(HardLinksDisabled),
    /// A store copy finished.
    CopyFinished(CopyFinished),
}

impl StoreEvent {
    /// Short, stable name of the event kind, used as the `event_type` log field.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Opened(_) => "store.opened",
            Self::StorageFailure(_) => "store.storage_failure",
            Self::CorruptRecord(_) => "store.corrupt_record",
            Self::ColumnCollected(_) => "gc.column_collected",
            Self::Closed(_) => "store.closed",
            Self::CopyFailure(_) => "snapshot.copy_failure",
            Self::HardLinksDisabled(_) => "snapshot.hard_links_disabled",
            Self::CopyFinished(_) => "snapshot.copy_finished",
        }
    }
}

/// Store open details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOpened {
    /// Store directory.
    pub path: String,
    /// Whether the session ended up read-only.
    pub read_only: bool,
    /// Whether a new store was created.
    pub created: bool,
    /// Whether an existing store was deleted because of a version mismatch.
    pub version_reset: bool,
    /// Columns that were missing and have been created empty.
    pub added_columns: Vec<String>,
}

/// The kind of engine operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageOperation {
    /// Point read.
    Get,
    /// Point write.
    Put,
    /// Point delete.
    Remove,
    /// Existence check.
    Contains,
    /// Batched write.
    WriteBatch,
}

impl fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Remove => "remove",
            Self::Contains => "contains",
            Self::WriteBatch => "write_batch",
        };
        f.write_str(name)
    }
}

/// A best-effort engine operation that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageFailure {
    /// Operation that failed.
    pub operation: StorageOperation,
    /// Column the operation targeted.
    pub column: String,
    /// Key the operation targeted (empty for batches).
    pub key: String,
    /// Engine error message.
    pub message: String,
}

/// A record that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptRecord {
    /// Column holding the record.
    pub column: String,
    /// Key of the record.
    pub key: String,
    /// Decoder error message.
    pub message: String,
}

/// Outcome of one column's garbage-collection pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCollected {
    /// Primary column of the collected group.
    pub column: String,
    /// Keys evaluated.
    pub total_keys: u64,
    /// Keys evicted (from the primary column and its key-space siblings).
    pub removed: u64,
    /// Entries in the persisted LRU map after the pass.
    pub lru_entries: u64,
    /// Wall-clock duration of the pass.
    pub duration_ms: u64,
    /// Whether the time budget ran out before the pass finished.
    pub canceled: bool,
    /// Whether this was the first pass (no prior LRU history, nothing evicted).
    pub first_run: bool,
}

/// Store close details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreClosed {
    /// Store directory.
    pub path: String,
    /// Whether garbage collection ran.
    pub garbage_collected: bool,
    /// Time spent in dispose.
    pub duration_ms: u64,
}

/// A file that could not be copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFailure {
    /// File (or directory) being copied.
    pub path: String,
    /// Error message.
    pub message: String,
}

/// First hard-link failure in a copy session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardLinksDisabled {
    /// File whose link failed.
    pub path: String,
    /// Error message.
    pub message: String,
}

/// Summary of a store copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFinished {
    /// Source store directory.
    pub source: String,
    /// Target log directory.
    pub destination: String,
    /// Files cloned copy-on-write.
    pub cloned: u64,
    /// Files hard-linked.
    pub hard_linked: u64,
    /// Files copied byte for byte.
    pub copied: u64,
    /// Outdated files skipped.
    pub skipped: u64,
    /// Files that failed.
    pub failed: u64,
    /// Wall-clock duration.
    pub duration_ms: u64,
}
