//! Crash handling policy: rollback window and crash-loop throttle.
//!
//! Both rules are keyed off the uptime of the crashed process and are
//! evaluated independently, so one crash can trigger both.

use std::time::Duration;

/// Time-based restart rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Crashes sooner than this after a start roll back to the previous image
    pub rollback_window: Duration,
    /// Crashes sooner than this after a start delay the restart by this long
    pub min_uptime: Duration,
    /// Grace period between SIGTERM and SIGKILL when stopping
    pub stop_timeout: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            rollback_window: Duration::from_secs(30),
            min_uptime: Duration::from_secs(3),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// What to do about one crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashDecision {
    /// Restore the rollback image before restarting
    pub rollback: bool,
    /// Wait this long before restarting
    pub throttle: Option<Duration>,
}

impl RestartPolicy {
    pub fn on_crash(&self, uptime: Duration) -> CrashDecision {
        CrashDecision {
            rollback: uptime < self.rollback_window,
            throttle: (uptime < self.min_uptime).then_some(self.min_uptime),
        }
    }
}
