//! Callback scheduling aligned to a periodic display tick.
//!
//! Callers post work into one of a fixed set of [`Category`] queues. The
//! [`FrameScheduler`] subscribes to its [`TickSource`] only while work is
//! queued, and on every tick drains the due entries of each category in
//! dispatch order: input, animation, traversal, commit.

pub mod callback;
pub mod category;
pub mod clock;
pub mod config;
pub mod error;
pub mod frame;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod tick;

pub use callback::{Action, CallbackEntry, FrameCallback, HandleId, Payload, Token};
pub use category::Category;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::SchedulerConfig;
pub use error::{CallbackFailure, DispatchError, SchedulerError, SchedulerResult, TickSourceError};
pub use frame::NextFrame;
pub use queue::CallbackQueue;
pub use scheduler::{ErrorHandler, FrameScheduler, FrameSchedulerBuilder, SchedulerState};
pub use stats::SchedulerStats;
pub use tick::{ManualTickSource, TickCallback, TickSource};

#[cfg(feature = "tokio")]
pub use tick::IntervalTickSource;
