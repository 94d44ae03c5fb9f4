//! Store configuration.
//!
//! [`FingerprintStoreConfig`] is the serializable form read from TOML and the
//! environment. [`OpenOptions`] is what [`crate::FingerprintStore::open`]
//! consumes; it also carries the runtime collaborators (clock, event sink).

use crate::clock::{Clock, SystemClock};
use crate::{Error, Result};
use fpstore_events::{EventSink, TracingSink};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default maximum age of an untouched entry: 3 days.
pub const DEFAULT_MAX_ENTRY_AGE: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Default wall-clock budget for garbage collection.
pub const DEFAULT_GC_BUDGET: Duration = Duration::from_secs(10);

/// Environment variable overriding `max_entry_age_secs`.
pub const ENV_MAX_ENTRY_AGE_SECS: &str = "FPSTORE_MAX_ENTRY_AGE_SECS";
/// Environment variable overriding `gc_budget_ms`.
pub const ENV_GC_BUDGET_MS: &str = "FPSTORE_GC_BUDGET_MS";
/// Environment variable overriding `mode`.
pub const ENV_MODE: &str = "FPSTORE_MODE";

/// How puts treat entries that are already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintStoreMode {
    /// Leave an entry alone when its stored keys equal the new ones.
    #[default]
    Default,
    /// Always rewrite.
    IgnoreExistingEntries,
}

impl FingerprintStoreMode {
    /// Configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::IgnoreExistingEntries => "ignore-existing-entries",
        }
    }
}

impl fmt::Display for FingerprintStoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FingerprintStoreMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "default" => Ok(Self::Default),
            "ignore-existing-entries" => Ok(Self::IgnoreExistingEntries),
            other => Err(Error::configuration(format!(
                "unknown mode '{other}' (expected 'default' or 'ignore-existing-entries')"
            ))),
        }
    }
}

/// Serializable store settings.
///
/// ```toml
/// max_entry_age_secs = 259200
/// gc_budget_ms = 10000
/// mode = "default"
/// read_only = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FingerprintStoreConfig {
    /// Entries untouched for longer than this are evicted at close.
    pub max_entry_age_secs: u64,
    /// Garbage collection stops after this many milliseconds.
    pub gc_budget_ms: u64,
    /// Put behavior for existing entries.
    pub mode: FingerprintStoreMode,
    /// Open without write access.
    pub read_only: bool,
}

impl Default for FingerprintStoreConfig {
    fn default() -> Self {
        Self {
            max_entry_age_secs: DEFAULT_MAX_ENTRY_AGE.as_secs(),
            gc_budget_ms: 10_000,
            mode: FingerprintStoreMode::Default,
            read_only: false,
        }
    }
}

impl FingerprintStoreConfig {
    /// Parse TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::configuration(e.to_string()))
    }

    /// Read a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a configuration
    /// error if it does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        Self::from_toml_str(&text)
    }

    /// Apply `FPSTORE_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a variable holds an invalid value.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides looked up by variable name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a value does not parse.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_ENTRY_AGE_SECS) {
            self.max_entry_age_secs = parse_number(ENV_MAX_ENTRY_AGE_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_GC_BUDGET_MS) {
            self.gc_budget_ms = parse_number(ENV_GC_BUDGET_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_MODE) {
            self.mode = value.parse()?;
        }
        Ok(self)
    }

    /// Convert into open options with the default clock and sink.
    #[must_use]
    pub fn to_open_options(&self) -> OpenOptions {
        OpenOptions::new()
            .read_only(self.read_only)
            .max_entry_age(Duration::from_secs(self.max_entry_age_secs))
            .gc_budget(Duration::from_millis(self.gc_budget_ms))
            .mode(self.mode)
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::configuration(format!("{name}='{value}': {e}")))
}

/// Options for [`crate::FingerprintStore::open`].
#[derive(Clone)]
pub struct OpenOptions {
    pub(crate) read_only: bool,
    pub(crate) max_entry_age: Duration,
    pub(crate) gc_budget: Duration,
    pub(crate) mode: FingerprintStoreMode,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) sink: Arc<dyn EventSink>,
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("read_only", &self.read_only)
            .field("max_entry_age", &self.max_entry_age)
            .field("gc_budget", &self.gc_budget)
            .field("mode", &self.mode)
            .field("clock", &self.clock)
            .field("sink", &self.sink)
            .finish()
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            max_entry_age: DEFAULT_MAX_ENTRY_AGE,
            gc_budget: DEFAULT_GC_BUDGET,
            mode: FingerprintStoreMode::Default,
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
        }
    }
}

impl OpenOptions {
    /// Defaults: read-write, 3 day entry age, 10 s GC budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open without write access.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Maximum age of an untouched entry.
    #[must_use]
    pub fn max_entry_age(mut self, age: Duration) -> Self {
        self.max_entry_age = age;
        self
    }

    /// Wall-clock budget for garbage collection at close.
    #[must_use]
    pub fn gc_budget(mut self, budget: Duration) -> Self {
        self.gc_budget = budget;
        self
    }

    /// Put behavior for existing entries.
    #[must_use]
    pub fn mode(mut self, mode: FingerprintStoreMode) -> Self {
        self.mode = mode;
        self
    }

    /// Time source for LRU timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Destination for store events.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Whether the store is opened without write access.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}
