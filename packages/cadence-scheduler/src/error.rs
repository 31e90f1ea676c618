use crate::category::Category;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TickSourceError {
    #[error("tick source has shut down")]
    Closed,
    #[error("tick source needs a running async runtime")]
    NoRuntime,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("failed to request a tick: {0}")]
    TickSource(#[from] TickSourceError),
    #[error("frame time is only available while callbacks are running")]
    NotDispatching,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// How a dispatched callback failed.
#[derive(Debug, Error)]
pub enum CallbackFailure {
    #[error("callback returned an error: {0:#}")]
    Error(anyhow::Error),
    #[error("callback panicked: {0}")]
    Panic(String),
}

/// A callback failure observed during one dispatch pass.
#[derive(Debug, Error)]
#[error("{category} callback failed at frame {frame_time_nanos}: {failure}")]
pub struct DispatchError {
    pub category: Category,
    pub frame_time_nanos: u64,
    #[source]
    pub failure: CallbackFailure,
}

pub type SchedulerResult<T = ()> = Result<T, SchedulerError>;
