use serde::{Deserialize, Serialize};

/// Counters exposed for inspection and tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub frames_dispatched: u64,
    pub callbacks_invoked: u64,
    pub callbacks_failed: u64,
    /// Whole periods that elapsed between a tick's timestamp and its dispatch.
    pub frames_skipped: u64,
    pub pending: usize,
}
