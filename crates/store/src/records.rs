//! Structured records persisted by the store.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Fingerprints computed for one task execution.
///
/// Stored as JSON in the default column under the task's semi-stable id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipFingerprintKeys {
    /// Hash over the task's statically declared inputs.
    #[serde(rename = "WeakFingerprint")]
    pub weak_fingerprint: String,
    /// Hash over the dynamically observed inputs.
    #[serde(rename = "StrongFingerprint")]
    pub strong_fingerprint: String,
    /// Formatted hash of the path set; key of the path-set inputs in the
    /// content-hash column.
    #[serde(rename = "PathSet")]
    pub path_set_hash: String,
}

impl PipFingerprintKeys {
    /// Create a key record.
    #[must_use]
    pub fn new(
        weak_fingerprint: impl Into<String>,
        strong_fingerprint: impl Into<String>,
        path_set_hash: impl Into<String>,
    ) -> Self {
        Self {
            weak_fingerprint: weak_fingerprint.into(),
            strong_fingerprint: strong_fingerprint.into(),
            path_set_hash: path_set_hash.into(),
        }
    }
}

/// Why a task missed the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CacheMissKind {
    /// Unset.
    Invalid = 0,
    /// No descriptor matched the weak fingerprint.
    MissForDescriptorsDueToWeakFingerprints = 1,
    /// No descriptor matched the strong fingerprint.
    MissForDescriptorsDueToStrongFingerprints = 2,
    /// The cache entry was missing.
    MissForCacheEntry = 3,
    /// The descriptors were invalid.
    MissDueToInvalidDescriptors = 4,
    /// Process metadata was missing.
    MissForProcessMetadata = 5,
    /// Process metadata from historic metadata was missing.
    MissForProcessMetadataFromHistoricMetadata = 6,
    /// Output content was missing.
    MissForProcessOutputContent = 7,
    /// The task is configured as uncacheable.
    MissForProcessConfiguredUncacheable = 8,
    /// Not a miss.
    Hit = 9,
}

impl From<CacheMissKind> for u8 {
    fn from(kind: CacheMissKind) -> Self {
        kind as Self
    }
}

impl TryFrom<u8> for CacheMissKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Invalid,
            1 => Self::MissForDescriptorsDueToWeakFingerprints,
            2 => Self::MissForDescriptorsDueToStrongFingerprints,
            3 => Self::MissForCacheEntry,
            4 => Self::MissDueToInvalidDescriptors,
            5 => Self::MissForProcessMetadata,
            6 => Self::MissForProcessMetadataFromHistoricMetadata,
            7 => Self::MissForProcessOutputContent,
            8 => Self::MissForProcessConfiguredUncacheable,
            9 => Self::Hit,
            other => return Err(Error::codec(format!("unknown cache miss kind {other}"))),
        })
    }
}

/// A task that missed the cache in the last build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheMissInfo {
    /// Numeric task id within the build.
    #[serde(rename = "TaskId")]
    pub task_id: u32,
    /// Why it missed.
    #[serde(rename = "CacheMissKind")]
    pub kind: CacheMissKind,
}

impl CacheMissInfo {
    /// Create a cache-miss record.
    #[must_use]
    pub const fn new(task_id: u32, kind: CacheMissKind) -> Self {
        Self { task_id, kind }
    }
}
