use crate::error::SchedulerError;
use serde::{Deserialize, Serialize};

/// Default latency budget between a refresh boundary and input sampling.
pub const DEFAULT_FRAME_DELAY_NANOS: u64 = 10_000_000;

/// Number of consecutive skipped frames that triggers a log line.
pub const DEFAULT_SKIPPED_FRAME_WARNING_LIMIT: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Carried for consumers; has no effect on ordering or matching.
    pub frame_delay_nanos: u64,
    pub skipped_frame_warning_limit: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_delay_nanos: DEFAULT_FRAME_DELAY_NANOS,
            skipped_frame_warning_limit: DEFAULT_SKIPPED_FRAME_WARNING_LIMIT,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SchedulerError> {
        serde_json::from_str(json).map_err(|e| SchedulerError::InvalidConfig(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
