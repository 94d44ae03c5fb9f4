//! Garbage collection at close.
//!
//! Each [`ColumnGroup`] is collected independently and in parallel:
//!
//! 1. Load the group's LRU map (missing or unreadable means empty).
//! 2. Stamp every key touched this session with the current time.
//! 3. With no prior map there is no history to judge age by: persist and stop.
//! 4. Otherwise delete every key whose timestamp is older than the max entry
//!    age from the primary column and its siblings. Keys without a timestamp
//!    are kept. Aliases whose target entry is gone are deleted too, unless
//!    they were touched this session.
//! 5. Persist the updated map.
//!
//! All groups share one [`TimeBudget`]. Running out stops eviction between
//! keys; the partial result is persisted and the group reports `canceled`.

use crate::accessor::GarbageCollectResult;
use crate::budget::TimeBudget;
use crate::clock::duration_to_ticks;
use crate::codec;
use crate::columns::{Column, ColumnGroup, LRU_ENTRIES_MAP_KEY, is_metadata_key};
use crate::counters::Counter;
use crate::lru::LruEntriesMap;
use crate::store::{FingerprintStore, duration_ms};
use crate::Result;
use fpstore_events::{ColumnCollected, StoreEvent};
use rayon::prelude::*;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Result of collecting one column group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnGcReport {
    /// Group that was collected.
    pub group: ColumnGroup,
    /// Keys evaluated in the primary column.
    pub total_keys: u64,
    /// Keys deleted (including dangling aliases).
    pub removed: u64,
    /// Aliases deleted because their target was missing.
    pub dangling: u64,
    /// Entries in the persisted LRU map.
    pub lru_entries: u64,
    /// The time budget ran out.
    pub canceled: bool,
    /// No LRU map existed before this pass.
    pub first_run: bool,
    /// Wall time spent on the group.
    pub duration: Duration,
}

impl ColumnGcReport {
    /// Primary column of the group.
    #[must_use]
    pub fn column(&self) -> Column {
        self.group.primary()
    }
}

/// Result of one garbage-collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// One report per column group, in [`ColumnGroup::ALL`] order.
    pub columns: Vec<ColumnGcReport>,
    /// Wall time of the whole pass.
    pub duration: Duration,
}

impl GcReport {
    /// Keys deleted across all groups.
    #[must_use]
    pub fn total_removed(&self) -> u64 {
        self.columns.iter().map(|c| c.removed).sum()
    }

    /// Whether any group ran out of time.
    #[must_use]
    pub fn any_canceled(&self) -> bool {
        self.columns.iter().any(|c| c.canceled)
    }

    /// Report for one group.
    #[must_use]
    pub fn group(&self, group: ColumnGroup) -> Option<&ColumnGcReport> {
        self.columns.iter().find(|c| c.group == group)
    }
}

impl FingerprintStore {
    /// Renew touched keys and evict expired ones in every column group.
    ///
    /// Takes `&mut self`: no lookups or puts may run concurrently.
    pub(crate) fn collect_garbage(&mut self) -> Result<GcReport> {
        let started = Instant::now();
        let touched: Vec<(ColumnGroup, Vec<String>)> = ColumnGroup::ALL
            .iter()
            .map(|&group| (group, self.tracker.drain(group)))
            .collect();

        let budget = TimeBudget::start(self.options.gc_budget);
        let now = self.options.clock.now_ticks();
        let max_age = duration_to_ticks(self.options.max_entry_age);

        let store = &*self;
        let columns = touched
            .into_par_iter()
            .map(|(group, keys)| store.collect_group(group, &keys, now, max_age, &budget))
            .collect::<Result<Vec<_>>>()?;

        let duration = started.elapsed();
        self.counters.add(Counter::GcDurationMs, duration_ms(started));
        Ok(GcReport { columns, duration })
    }

    fn collect_group(
        &self,
        group: ColumnGroup,
        touched: &[String],
        now: i64,
        max_age: i64,
        budget: &TimeBudget,
    ) -> Result<ColumnGcReport> {
        let started = Instant::now();
        let primary = group.primary();

        let stored = self.accessor.get(primary, LRU_ENTRIES_MAP_KEY)?;
        let had_map = stored.is_some();
        let mut map = stored
            .and_then(|bytes| {
                self.decode(primary, LRU_ENTRIES_MAP_KEY, codec::decode_lru_entries(&bytes))
            })
            .unwrap_or_default();

        let first_run = map.is_empty();
        map.merge_touched(touched.iter().map(String::as_str), now);

        let mut result = GarbageCollectResult::default();
        let mut dangling = 0u64;
        if !first_run {
            let touched: HashSet<&str> = touched.iter().map(String::as_str).collect();
            result = self.accessor.garbage_collect(
                primary,
                group.siblings(),
                |key, value| {
                    if is_metadata_key(key) {
                        return false;
                    }
                    if map.is_expired(key, now, max_age) {
                        return true;
                    }
                    if group == ColumnGroup::OutputAliases
                        && !touched.contains(key)
                        && self.is_dangling_alias(value)
                    {
                        dangling += 1;
                        return true;
                    }
                    false
                },
                budget,
            )?;
        }

        for key in &result.removed_keys {
            map.remove(key);
        }
        if !result.canceled {
            map.prune_expired(now, max_age);
        }
        persist_map(self, primary, &map, had_map)?;

        let report = ColumnGcReport {
            group,
            total_keys: result.total_count,
            removed: result.removed_keys.len() as u64,
            dangling,
            lru_entries: map.len() as u64,
            canceled: result.canceled,
            first_run,
            duration: started.elapsed(),
        };

        self.counters.add(Counter::collected(group), report.removed);
        self.counters.add(Counter::DanglingAliasesCollected, dangling);
        if report.canceled {
            self.counters.increment(Counter::GcCanceledColumns);
        }
        self.options.sink.emit(&StoreEvent::ColumnCollected(ColumnCollected {
            column: primary.to_string(),
            total_keys: report.total_keys,
            removed: report.removed,
            lru_entries: report.lru_entries,
            duration_ms: duration_ms(started),
            canceled: report.canceled,
            first_run,
        }));
        Ok(report)
    }

    /// Whether an alias value names an id with no fingerprint keys.
    ///
    /// Lookup failures count as "not dangling".
    fn is_dangling_alias(&self, target: &[u8]) -> bool {
        let Ok(target) = std::str::from_utf8(target) else {
            return true;
        };
        matches!(self.accessor.contains(Column::Default, target), Ok(false))
    }
}

/// Write the map, or drop a stale one when nothing is left to track.
fn persist_map(
    store: &FingerprintStore,
    column: Column,
    map: &LruEntriesMap,
    had_map: bool,
) -> Result<()> {
    if map.is_empty() {
        if had_map {
            store.accessor.remove(column, LRU_ENTRIES_MAP_KEY)?;
        }
        return Ok(());
    }
    store
        .accessor
        .put(column, LRU_ENTRIES_MAP_KEY, &codec::encode_lru_entries(map)?)
}
