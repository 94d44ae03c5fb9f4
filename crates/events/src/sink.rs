//! Event sinks.
//!
//! The store reports everything through an [`EventSink`]. [`TracingSink`]
//! turns events into structured `tracing` records, [`MemorySink`] keeps them
//! in memory so tests can assert on them.

use crate::event::{StoreEvent, TimestampedEvent};
use std::fmt;
use std::sync::Mutex;

/// Receiver of store events.
///
/// Implementations must be cheap and must not block: events are emitted from
/// worker threads in the middle of store operations.
pub trait EventSink: Send + Sync + fmt::Debug {
    /// Handle one event.
    fn emit(&self, event: &StoreEvent);
}

/// Sink that logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &StoreEvent) {
        match event {
            StoreEvent::Opened(e) => crate::emit_store_opened!(
                e.path,
                e.read_only,
                e.created,
                e.version_reset,
                e.added_columns
            ),
            StoreEvent::StorageFailure(e) => {
                crate::emit_storage_failure!(e.operation, e.column, e.key, e.message);
            }
            StoreEvent::CorruptRecord(e) => {
                crate::emit_corrupt_record!(e.column, e.key, e.message);
            }
            StoreEvent::ColumnCollected(e) => {
                if e.canceled {
                    crate::emit_gc_canceled!(e.column, e.total_keys, e.removed, e.duration_ms);
                } else {
                    crate::emit_column_collected!(
                        e.column,
                        e.total_keys,
                        e.removed,
                        e.lru_entries,
                        e.duration_ms,
                        e.first_run
                    );
                }
            }
            StoreEvent::Closed(e) => {
                crate::emit_store_closed!(e.path, e.garbage_collected, e.duration_ms);
            }
            StoreEvent::CopyFailure(e) => crate::emit_copy_failure!(e.path, e.message),
            StoreEvent::HardLinksDisabled(e) => {
                crate::emit_hard_links_disabled!(e.path, e.message);
            }
            StoreEvent::CopyFinished(e) => crate::emit_copy_finished!(
                e.source,
                e.destination,
                e.cloned,
                e.hard_linked,
                e.copied,
                e.skipped,
                e.failed,
                e.duration_ms
            ),
        }
    }
}

/// Sink that records events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TimestampedEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event recorded so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<StoreEvent> {
        self.events
            .lock()
            .map(|guard| guard.iter().map(|e| e.event.clone()).collect())
            .unwrap_or_default()
    }

    /// Remove and return every recorded event.
    pub fn take(&self) -> Vec<TimestampedEvent> {
        self.events
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }

    /// Number of recorded events whose `event_type` equals `event_type`.
    #[must_use]
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .map(|guard| {
                guard
                    .iter()
                    .filter(|e| e.event.event_type() == event_type)
                    .count()
            })
            .unwrap_or(0)
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &StoreEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(TimestampedEvent::now(event.clone()));
        }
    }
}
