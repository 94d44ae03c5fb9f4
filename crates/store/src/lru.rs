//! Least-recently-used bookkeeping.
//!
//! Two halves, reused for every tracked column group:
//!
//! - [`LruEntryTracker`]: the set of keys touched during this session. Many
//!   threads add to it concurrently; it is drained once, at close.
//! - [`LruEntriesMap`]: the persisted key → last-touched timestamp map that
//!   garbage collection judges age by.

use crate::columns::ColumnGroup;
use dashmap::DashSet;
use std::collections::BTreeMap;

/// Persisted last-touched timestamps for one column group.
///
/// A key with no timestamp is never considered expired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LruEntriesMap {
    entries: BTreeMap<String, i64>,
}

impl LruEntriesMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last-touched timestamp of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<i64> {
        self.entries.get(key).copied()
    }

    /// Record `key` as touched at `now`, replacing any older timestamp.
    pub fn touch(&mut self, key: impl Into<String>, now: i64) {
        self.entries.insert(key.into(), now);
    }

    /// Record every key in `keys` as touched at `now`.
    pub fn merge_touched<I, K>(&mut self, keys: I, now: i64)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        for key in keys {
            self.touch(key, now);
        }
    }

    /// Whether `key` has a timestamp older than `max_age` ticks at `now`.
    #[must_use]
    pub fn is_expired(&self, key: &str, now: i64, max_age: i64) -> bool {
        self.get(key)
            .is_some_and(|touched| now.saturating_sub(touched) > max_age)
    }

    /// Stop tracking `key`.
    pub fn remove(&mut self, key: &str) -> Option<i64> {
        self.entries.remove(key)
    }

    /// Drop every entry older than `max_age`; returns how many were dropped.
    pub fn prune_expired(&mut self, now: i64, max_age: i64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, touched| now.saturating_sub(*touched) <= max_age);
        before - self.entries.len()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, i64)> for LruEntriesMap {
    fn from_iter<T: IntoIterator<Item = (String, i64)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Keys touched during the current session, per column group.
#[derive(Debug, Default)]
pub struct LruEntryTracker {
    touched: [DashSet<String>; ColumnGroup::ALL.len()],
}

impl LruEntryTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as touched. Safe to call from any number of threads.
    pub fn track(&self, group: ColumnGroup, key: &str) {
        let set = &self.touched[group.index()];
        if !set.contains(key) {
            set.insert(key.to_owned());
        }
    }

    /// Number of distinct keys touched in `group`.
    #[must_use]
    pub fn len(&self, group: ColumnGroup) -> usize {
        self.touched[group.index()].len()
    }

    /// Whether `key` was touched in `group`.
    #[must_use]
    pub fn contains(&self, group: ColumnGroup, key: &str) -> bool {
        self.touched[group.index()].contains(key)
    }

    /// Take every key touched in `group`, leaving it empty.
    ///
    /// Requires exclusive access: all writers must have finished.
    pub fn drain(&mut self, group: ColumnGroup) -> Vec<String> {
        std::mem::take(&mut self.touched[group.index()])
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_touch_overwrites_timestamp() {
        let mut map = LruEntriesMap::new();
        map.touch("a", 10);
        map.touch("a", 20);
        assert_eq!(map.get("a"), Some(20));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_untracked_key_never_expires() {
        let map = LruEntriesMap::new();
        assert!(!map.is_expired("missing", i64::MAX, 0));
    }

    #[test]
    fn test_expiry_is_strictly_greater_than_max_age() {
        let mut map = LruEntriesMap::new();
        map.touch("a", 100);
        assert!(!map.is_expired("a", 150, 50));
        assert!(map.is_expired("a", 151, 50));
    }

    #[test]
    fn test_prune_expired() {
        let mut map: LruEntriesMap =
            [("old".to_string(), 0), ("new".to_string(), 90)].into_iter().collect();
        assert_eq!(map.prune_expired(100, 50), 1);
        assert_eq!(map.get("old"), None);
        assert_eq!(map.get("new"), Some(90));
    }

    #[test]
    fn test_merge_touched() {
        let mut map = LruEntriesMap::new();
        map.touch("a", 1);
        map.merge_touched(vec!["a", "b"], 7);
        assert_eq!(map.get("a"), Some(7));
        assert_eq!(map.get("b"), Some(7));
    }

    #[test]
    fn test_tracker_is_idempotent_and_per_group() {
        let mut tracker = LruEntryTracker::new();
        tracker.track(ColumnGroup::Fingerprints, "P1");
        tracker.track(ColumnGroup::Fingerprints, "P1");
        tracker.track(ColumnGroup::ContentHashes, "H1");

        assert_eq!(tracker.len(ColumnGroup::Fingerprints), 1);
        assert!(tracker.contains(ColumnGroup::ContentHashes, "H1"));
        assert!(!tracker.contains(ColumnGroup::OutputAliases, "H1"));

        let drained = tracker.drain(ColumnGroup::Fingerprints);
        assert_eq!(drained, vec!["P1".to_string()]);
        assert_eq!(tracker.len(ColumnGroup::Fingerprints), 0);
        assert_eq!(tracker.len(ColumnGroup::ContentHashes), 1);
    }

    #[test]
    fn test_tracker_concurrent_adds() {
        let tracker = Arc::new(LruEntryTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        // Half of the keys collide across threads.
                        tracker.track(ColumnGroup::Fingerprints, &format!("shared-{i}"));
                        tracker.track(ColumnGroup::Fingerprints, &format!("own-{t}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.len(ColumnGroup::Fingerprints), 500 + 8 * 500);
    }
}
