//! Break suggestions for long sessions.

use chrono::{DateTime, Duration, Utc};

/// Default session length before a break is offered.
pub const DEFAULT_BREAK_AFTER_MINUTES: i64 = 20;

/// Decides when a learner should be offered a break.
///
/// The monitor is a pure predicate. Pausing, resuming and resetting the
/// session timer are the state machine's job.
#[derive(Debug, Clone, Copy)]
pub struct FatigueMonitor {
    threshold: Duration,
}

impl Default for FatigueMonitor {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_BREAK_AFTER_MINUTES))
    }
}

impl FatigueMonitor {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// `true` once the session has run longer than the threshold, unless a
    /// break was already offered since the timer last started.
    pub fn should_suggest_break(
        &self,
        session_start: DateTime<Utc>,
        now: DateTime<Utc>,
        already_suggested: bool,
    ) -> bool {
        !already_suggested && now - session_start > self.threshold
    }
}
