use crate::error::TickSourceError;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Receives the timestamp of the tick it was registered for.
pub type TickCallback = Box<dyn FnOnce(u64) + Send>;

/// Periodic timing signal the scheduler subscribes to.
pub trait TickSource: Send + Sync {
    /// Registers a one-shot subscription for the next tick.
    ///
    /// The callback fires at most once, with a timestamp no earlier than any
    /// timestamp this source handed out before.
    fn request_tick(&self, on_tick: TickCallback) -> Result<(), TickSourceError>;

    /// Nominal refresh period. Diagnostic only.
    fn nominal_period_nanos(&self) -> u64;
}

struct ManualState {
    pending: Mutex<Option<TickCallback>>,
    requests: AtomicU64,
    closed: AtomicBool,
    period_nanos: u64,
}

/// Tick source fired explicitly by the host.
///
/// Useful for deterministic hosts and tests. Clones drive the same source.
#[derive(Clone)]
pub struct ManualTickSource {
    state: Arc<ManualState>,
}

impl ManualTickSource {
    pub fn new(period_nanos: u64) -> Self {
        Self {
            state: Arc::new(ManualState {
                pending: Mutex::new(None),
                requests: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                period_nanos,
            }),
        }
    }

    /// Fires the pending subscription, if any. Returns whether one fired.
    pub fn fire(&self, timestamp_nanos: u64) -> bool {
        let pending = self
            .state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(on_tick) => {
                on_tick(timestamp_nanos);
                true
            }
            None => false,
        }
    }

    pub fn has_pending_request(&self) -> bool {
        self.state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Total subscriptions accepted since creation.
    pub fn request_count(&self) -> u64 {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Refuses further requests and drops the pending one.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl TickSource for ManualTickSource {
    fn request_tick(&self, on_tick: TickCallback) -> Result<(), TickSourceError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(TickSourceError::Closed);
        }
        let mut pending = self
            .state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if pending.is_some() {
            tracing::warn!("Replacing an unfired tick request");
        }
        *pending = Some(on_tick);
        self.state.requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn nominal_period_nanos(&self) -> u64 {
        self.state.period_nanos
    }
}

#[cfg(feature = "tokio")]
pub use interval::IntervalTickSource;

#[cfg(feature = "tokio")]
mod interval {
    use super::{TickCallback, TickSource};
    use crate::clock::Clock;
    use crate::error::TickSourceError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::task::JoinHandle;
    use tokio::time::MissedTickBehavior;

    struct Shared {
        pending: Mutex<Option<TickCallback>>,
        wake: Notify,
        closed: AtomicBool,
    }

    /// Software refresh signal built on a tokio interval.
    ///
    /// The driving task sleeps while nobody is subscribed. Callbacks run on
    /// that task, so at most one fires at a time.
    pub struct IntervalTickSource {
        shared: Arc<Shared>,
        task: JoinHandle<()>,
        period: Duration,
    }

    impl IntervalTickSource {
        /// Spawns the driving task on the current tokio runtime.
        pub fn spawn(
            period: Duration,
            clock: impl Clock + 'static,
        ) -> Result<Self, TickSourceError> {
            let handle =
                tokio::runtime::Handle::try_current().map_err(|_| TickSourceError::NoRuntime)?;
            let shared = Arc::new(Shared {
                pending: Mutex::new(None),
                wake: Notify::new(),
                closed: AtomicBool::new(false),
            });
            let task = handle.spawn(drive(shared.clone(), period, clock));
            tracing::debug!("Interval tick source started with period {:?}", period);
            Ok(Self {
                shared,
                task,
                period,
            })
        }

        pub fn period(&self) -> Duration {
            self.period
        }
    }

    async fn drive(shared: Arc<Shared>, period: Duration, clock: impl Clock) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let on_tick = shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            match on_tick {
                Some(on_tick) => on_tick(clock.now_nanos()),
                None => shared.wake.notified().await,
            }
        }
    }

    impl TickSource for IntervalTickSource {
        fn request_tick(&self, on_tick: TickCallback) -> Result<(), TickSourceError> {
            if self.shared.closed.load(Ordering::SeqCst) || self.task.is_finished() {
                return Err(TickSourceError::Closed);
            }
            *self
                .shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(on_tick);
            self.shared.wake.notify_one();
            Ok(())
        }

        fn nominal_period_nanos(&self) -> u64 {
            u64::try_from(self.period.as_nanos()).unwrap_or(u64::MAX)
        }
    }

    impl Drop for IntervalTickSource {
        fn drop(&mut self) {
            self.shared.closed.store(true, Ordering::SeqCst);
            self.task.abort();
        }
    }
}
