//! Wall-clock budget for garbage collection.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Deadline shared by every column collected in one pass.
///
/// Workers poll [`TimeBudget::is_exhausted`] between keys. The first poll past
/// the deadline cancels the shared token, so the remaining workers stop at their
/// next poll even if their own clocks lag.
#[derive(Debug, Clone)]
pub struct TimeBudget {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl TimeBudget {
    /// Start a budget of `budget` from now.
    ///
    /// A budget too large to represent never expires.
    #[must_use]
    pub fn start(budget: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Instant::now().checked_add(budget),
        }
    }

    /// A budget that never expires on its own.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Whether work should stop.
    pub fn is_exhausted(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            self.token.cancel();
            return true;
        }
        false
    }

    /// Stop all work sharing this budget.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Time left, or `None` when unlimited.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}
