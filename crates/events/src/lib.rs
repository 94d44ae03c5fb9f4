//! Structured events for the fingerprint store.
//!
//! The store never logs ad hoc. Every noteworthy thing it does is a plain
//! record in [`StoreEvent`], handed to an [`EventSink`]. The default
//! [`TracingSink`] forwards events to `tracing` through the emit macros below,
//! each with a fixed target and an `event_type` field so subscribers can filter
//! on them.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fpstore_events::{EventSink, MemorySink, StoreEvent};
//!
//! let sink = MemorySink::new();
//! // hand `Arc::new(sink)` to the store, then inspect `sink.events()`
//! ```

pub mod event;
pub mod sink;

pub use event::{
    ColumnCollected, CopyFailure, CopyFinished, CorruptRecord, HardLinksDisabled, StorageFailure,
    StorageOperation, StoreClosed, StoreEvent, StoreOpened, TimestampedEvent,
};
pub use sink::{EventSink, MemorySink, TracingSink};

// ============================================================================
// Emit Macros
// ============================================================================

/// Emit a store opened event.
///
/// # Example
/// ```rust,ignore
/// emit_store_opened!("/tmp/store", false, true, false, Vec::<String>::new());
/// ```
#[macro_export]
macro_rules! emit_store_opened {
    ($path:expr, $read_only:expr, $created:expr, $version_reset:expr, $added_columns:expr) => {
        ::tracing::info!(
            target: "fpstore::store",
            event_type = "store.opened",
            path = %$path,
            read_only = $read_only,
            created = $created,
            version_reset = $version_reset,
            added_columns = ?$added_columns,
        )
    };
}

/// Emit a best-effort storage failure.
#[macro_export]
macro_rules! emit_storage_failure {
    ($operation:expr, $column:expr, $key:expr, $message:expr) => {
        ::tracing::warn!(
            target: "fpstore::store",
            event_type = "store.storage_failure",
            operation = %$operation,
            column = %$column,
            key = %$key,
            error = %$message,
        )
    };
}

/// Emit a corrupt record event.
#[macro_export]
macro_rules! emit_corrupt_record {
    ($column:expr, $key:expr, $message:expr) => {
        ::tracing::warn!(
            target: "fpstore::store",
            event_type = "store.corrupt_record",
            column = %$column,
            key = %$key,
            error = %$message,
        )
    };
}

/// Emit a completed column garbage-collection pass.
///
/// # Example
/// ```rust,ignore
/// emit_column_collected!("default", 100_u64, 3_u64, 97_u64, 12_u64, false);
/// ```
#[macro_export]
macro_rules! emit_column_collected {
    ($column:expr, $total:expr, $removed:expr, $lru_entries:expr, $duration_ms:expr, $first_run:expr) => {
        ::tracing::info!(
            target: "fpstore::gc",
            event_type = "gc.column_collected",
            column = %$column,
            total_keys = $total,
            removed = $removed,
            lru_entries = $lru_entries,
            duration_ms = $duration_ms,
            first_run = $first_run,
        )
    };
}

/// Emit a canceled column garbage-collection pass.
///
/// Cancellation is informational: partial progress is kept.
#[macro_export]
macro_rules! emit_gc_canceled {
    ($column:expr, $total:expr, $removed:expr, $duration_ms:expr) => {
        ::tracing::info!(
            target: "fpstore::gc",
            event_type = "gc.canceled",
            column = %$column,
            total_keys = $total,
            removed = $removed,
            duration_ms = $duration_ms,
        )
    };
}

/// Emit a store closed event.
#[macro_export]
macro_rules! emit_store_closed {
    ($path:expr, $garbage_collected:expr, $duration_ms:expr) => {
        ::tracing::info!(
            target: "fpstore::store",
            event_type = "store.closed",
            path = %$path,
            garbage_collected = $garbage_collected,
            duration_ms = $duration_ms,
        )
    };
}

/// Emit a snapshot copy failure.
#[macro_export]
macro_rules! emit_copy_failure {
    ($path:expr, $message:expr) => {
        ::tracing::warn!(
            target: "fpstore::snapshot",
            event_type = "snapshot.copy_failure",
            path = %$path,
            error = %$message,
        )
    };
}

/// Emit the first hard-link failure of a copy session.
#[macro_export]
macro_rules! emit_hard_links_disabled {
    ($path:expr, $message:expr) => {
        ::tracing::info!(
            target: "fpstore::snapshot",
            event_type = "snapshot.hard_links_disabled",
            path = %$path,
            error = %$message,
        )
    };
}

/// Emit a finished store copy.
#[macro_export]
macro_rules! emit_copy_finished {
    ($source:expr, $destination:expr, $cloned:expr, $hard_linked:expr, $copied:expr, $skipped:expr, $failed:expr, $duration_ms:expr) => {
        ::tracing::info!(
            target: "fpstore::snapshot",
            event_type = "snapshot.copy_finished",
            source = %$source,
            destination = %$destination,
            cloned = $cloned,
            hard_linked = $hard_linked,
            copied = $copied,
            skipped = $skipped,
            failed = $failed,
            duration_ms = $duration_ms,
        )
    };
}
