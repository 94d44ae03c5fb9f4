//! Column families and the groups they are garbage-collected in.

use std::fmt;

/// Metadata key holding the binary cache-miss list (default column).
pub const CACHE_MISS_LIST_KEY: &str = "CacheMissListV2";

/// Metadata key holding a column group's LRU timestamp map.
pub const LRU_ENTRIES_MAP_KEY: &str = "LruEntriesMapV2";

/// Whether `key` is one of the fixed metadata keys rather than user data.
#[must_use]
pub fn is_metadata_key(key: &str) -> bool {
    key == CACHE_MISS_LIST_KEY || key == LRU_ENTRIES_MAP_KEY
}

/// One key space of the physical store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    /// Semi-stable id → JSON `PipFingerprintKeys`.
    Default,
    /// Semi-stable id → JSON weak-fingerprint inputs.
    WeakFingerprints,
    /// Semi-stable id → JSON strong-fingerprint inputs.
    StrongFingerprints,
    /// Content hash → JSON inputs (path sets, directory listings).
    ContentHashes,
    /// Stable output hash → semi-stable id.
    OutputIdentifierAlias,
}

impl Column {
    /// Every column, in creation order.
    pub const ALL: [Self; 5] = [
        Self::Default,
        Self::WeakFingerprints,
        Self::StrongFingerprints,
        Self::ContentHashes,
        Self::OutputIdentifierAlias,
    ];

    /// Column family name in the engine.
    ///
    /// `Default` maps onto the engine's built-in default column family.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::WeakFingerprints => "weak_fingerprints",
            Self::StrongFingerprints => "strong_fingerprints",
            Self::ContentHashes => "content_hashes",
            Self::OutputIdentifierAlias => "output_identifier_alias",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A primary column plus the columns that share its key space.
///
/// LRU tracking and eviction work per group: touching a key in the group
/// renews it in every member column, and evicting it removes it from all of
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnGroup {
    /// Default, weak and strong fingerprint columns, keyed by semi-stable id.
    Fingerprints,
    /// Content hashes.
    ContentHashes,
    /// Output identifier aliases.
    OutputAliases,
}

impl ColumnGroup {
    /// Every group.
    pub const ALL: [Self; 3] = [Self::Fingerprints, Self::ContentHashes, Self::OutputAliases];

    /// Column holding the group's keys and its LRU map.
    #[must_use]
    pub const fn primary(self) -> Column {
        match self {
            Self::Fingerprints => Column::Default,
            Self::ContentHashes => Column::ContentHashes,
            Self::OutputAliases => Column::OutputIdentifierAlias,
        }
    }

    /// Columns keyed by the primary column's keys.
    #[must_use]
    pub const fn siblings(self) -> &'static [Column] {
        match self {
            Self::Fingerprints => &[Column::WeakFingerprints, Column::StrongFingerprints],
            Self::ContentHashes | Self::OutputAliases => &[],
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Fingerprints => 0,
            Self::ContentHashes => 1,
            Self::OutputAliases => 2,
        }
    }
}

impl fmt::Display for ColumnGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.primary().name())
    }
}
