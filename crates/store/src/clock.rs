//! Time source for LRU timestamps.
//!
//! Timestamps ("ticks") are milliseconds since the Unix epoch. The same clock
//! stamps touched keys and judges their age, so tests can drive eviction by
//! moving a [`ManualClock`] instead of sleeping.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of the current time in ticks.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ticks(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ticks(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: AtomicI64,
}

impl ManualClock {
    /// Create a clock reading `ticks`.
    #[must_use]
    pub fn new(ticks: i64) -> Self {
        Self {
            ticks: AtomicI64::new(ticks),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.ticks.fetch_add(duration_to_ticks(by), Ordering::SeqCst);
    }

    /// Set the clock to an absolute reading.
    pub fn set(&self, ticks: i64) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ticks(&self) -> i64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

/// Convert a duration to ticks, saturating at `i64::MAX`.
#[must_use]
pub fn duration_to_ticks(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
