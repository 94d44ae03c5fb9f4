//! Per-store counters.

use crate::columns::ColumnGroup;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Something the store counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Counter {
    /// Fingerprint entries written.
    EntriesPut,
    /// Entries left in place because identical keys were already stored.
    EntriesSkipped,
    /// Path sets written alongside an entry.
    PathSetsPut,
    /// Content hash values written directly.
    ContentHashesPut,
    /// Output aliases written.
    OutputAliasesPut,
    /// Entry lookups by semi-stable id.
    EntryLookups,
    /// Entry lookups that found a complete entry.
    EntryHits,
    /// Entry lookups resolved through an output alias.
    AliasHits,
    /// Alias lookups that fell back to the semi-stable id.
    AliasFallbacks,
    /// Single-key engine operations that failed.
    StorageFailures,
    /// Stored values that could not be decoded.
    CorruptRecords,
    /// Fingerprint keys evicted by garbage collection.
    FingerprintsCollected,
    /// Content hashes evicted by garbage collection.
    ContentHashesCollected,
    /// Output aliases evicted by garbage collection.
    OutputAliasesCollected,
    /// Aliases evicted because their target entry is gone.
    DanglingAliasesCollected,
    /// Column passes stopped by the time budget.
    GcCanceledColumns,
    /// Total garbage collection wall time.
    GcDurationMs,
}

impl Counter {
    /// Every counter.
    pub const ALL: [Self; 17] = [
        Self::EntriesPut,
        Self::EntriesSkipped,
        Self::PathSetsPut,
        Self::ContentHashesPut,
        Self::OutputAliasesPut,
        Self::EntryLookups,
        Self::EntryHits,
        Self::AliasHits,
        Self::AliasFallbacks,
        Self::StorageFailures,
        Self::CorruptRecords,
        Self::FingerprintsCollected,
        Self::ContentHashesCollected,
        Self::OutputAliasesCollected,
        Self::DanglingAliasesCollected,
        Self::GcCanceledColumns,
        Self::GcDurationMs,
    ];

    /// Snake-case name used in reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::EntriesPut => "entries_put",
            Self::EntriesSkipped => "entries_skipped",
            Self::PathSetsPut => "path_sets_put",
            Self::ContentHashesPut => "content_hashes_put",
            Self::OutputAliasesPut => "output_aliases_put",
            Self::EntryLookups => "entry_lookups",
            Self::EntryHits => "entry_hits",
            Self::AliasHits => "alias_hits",
            Self::AliasFallbacks => "alias_fallbacks",
            Self::StorageFailures => "storage_failures",
            Self::CorruptRecords => "corrupt_records",
            Self::FingerprintsCollected => "fingerprints_collected",
            Self::ContentHashesCollected => "content_hashes_collected",
            Self::OutputAliasesCollected => "output_aliases_collected",
            Self::DanglingAliasesCollected => "dangling_aliases_collected",
            Self::GcCanceledColumns => "gc_canceled_columns",
            Self::GcDurationMs => "gc_duration_ms",
        }
    }

    /// Eviction counter for a column group.
    #[must_use]
    pub const fn collected(group: ColumnGroup) -> Self {
        match group {
            ColumnGroup::Fingerprints => Self::FingerprintsCollected,
            ColumnGroup::ContentHashes => Self::ContentHashesCollected,
            ColumnGroup::OutputAliases => Self::OutputAliasesCollected,
        }
    }
}

/// Atomic counters owned by one store.
///
/// Shared by reference with GC workers; every update is a relaxed add.
#[derive(Debug, Default)]
pub struct StoreCounters {
    values: [AtomicU64; Counter::ALL.len()],
}

impl StoreCounters {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one.
    pub fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }

    /// Add `amount`.
    pub fn add(&self, counter: Counter, amount: u64) {
        self.values[counter as usize].fetch_add(amount, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter as usize].load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter, keyed by name.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        Counter::ALL
            .iter()
            .map(|&counter| (counter.name(), self.get(counter)))
            .collect()
    }
}
