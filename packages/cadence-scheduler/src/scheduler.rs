use crate::callback::{Action, CallbackEntry, FrameCallback, Payload, Token};
use crate::category::Category;
use crate::clock::{Clock, MonotonicClock};
use crate::config::SchedulerConfig;
use crate::error::{CallbackFailure, DispatchError, SchedulerError, SchedulerResult};
use crate::frame::NextFrame;
use crate::queue::CallbackQueue;
use crate::stats::SchedulerStats;
use crate::tick::TickSource;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Receives callback failures captured during dispatch.
pub type ErrorHandler = Arc<dyn Fn(&DispatchError) + Send + Sync>;

/// Subscription lifecycle of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing queued, no tick requested.
    Idle,
    /// A tick has been requested and not yet delivered.
    TickRequested,
    /// Inside a dispatch pass.
    Dispatching,
}

struct Shared {
    queues: [CallbackQueue; Category::COUNT],
    state: SchedulerState,
    next_sequence: u64,
    config: SchedulerConfig,
    frame_time_nanos: Option<u64>,
    last_frame_time_nanos: Option<u64>,
    stats: SchedulerStats,
}

impl Shared {
    fn pending(&self) -> usize {
        self.queues.iter().map(CallbackQueue::len).sum()
    }
}

struct Inner {
    shared: Mutex<Shared>,
    tick_source: Arc<dyn TickSource>,
    clock: Arc<dyn Clock>,
    error_handler: ErrorHandler,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs posted callbacks in step with a periodic tick.
///
/// The handle is cheap to clone and may be shared across threads. Every
/// clone drives the same queues; create one scheduler per owning context.
///
/// ```
/// use cadence_scheduler::{Action, Category, FrameScheduler, ManualClock, ManualTickSource};
///
/// let clock = ManualClock::new(0);
/// let ticks = ManualTickSource::new(16_666_667);
/// let scheduler = FrameScheduler::builder(ticks.clone())
///     .with_clock(clock.clone())
///     .build();
///
/// scheduler
///     .post_action(Category::Animation, &Action::new(|| println!("animate")), None)
///     .unwrap();
///
/// let frame_time = clock.advance(16_666_667);
/// assert!(ticks.fire(frame_time));
/// assert!(!scheduler.has_pending());
/// ```
#[derive(Clone)]
pub struct FrameScheduler {
    inner: Arc<Inner>,
}

pub struct FrameSchedulerBuilder {
    tick_source: Arc<dyn TickSource>,
    clock: Option<Arc<dyn Clock>>,
    config: SchedulerConfig,
    error_handler: Option<ErrorHandler>,
}

impl FrameSchedulerBuilder {
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&DispatchError) + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> FrameScheduler {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let error_handler = self
            .error_handler
            .unwrap_or_else(|| Arc::new(log_dispatch_error));

        FrameScheduler {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    queues: Default::default(),
                    state: SchedulerState::Idle,
                    next_sequence: 0,
                    config: self.config,
                    frame_time_nanos: None,
                    last_frame_time_nanos: None,
                    stats: SchedulerStats::default(),
                }),
                tick_source: self.tick_source,
                clock,
                error_handler,
            }),
        }
    }
}

fn log_dispatch_error(error: &DispatchError) {
    tracing::error!("Dropping failed callback: {}", error);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn delay_to_nanos(delay_millis: i64) -> u64 {
    u64::try_from(delay_millis)
        .unwrap_or(0)
        .saturating_mul(NANOS_PER_MILLI)
}

impl FrameScheduler {
    pub fn builder(tick_source: impl TickSource + 'static) -> FrameSchedulerBuilder {
        FrameSchedulerBuilder {
            tick_source: Arc::new(tick_source),
            clock: None,
            config: SchedulerConfig::default(),
            error_handler: None,
        }
    }

    pub fn new(tick_source: impl TickSource + 'static, clock: impl Clock + 'static) -> Self {
        Self::builder(tick_source).with_clock(clock).build()
    }

    /// Posts `action` to run on the first tick after posting.
    pub fn post_action(
        &self,
        category: Category,
        action: &Action,
        token: Option<&Token>,
    ) -> SchedulerResult {
        self.post_action_delayed(category, action, token, 0)
    }

    /// Posts `action` to run on the first tick at least `delay_millis` from now.
    /// Negative delays count as zero.
    pub fn post_action_delayed(
        &self,
        category: Category,
        action: &Action,
        token: Option<&Token>,
        delay_millis: i64,
    ) -> SchedulerResult {
        self.post(
            category,
            Payload::Action(action.clone()),
            token.cloned(),
            delay_millis,
        )
    }

    pub fn post_frame_callback(&self, callback: &FrameCallback) -> SchedulerResult {
        self.post_frame_callback_delayed(callback, 0)
    }

    /// Frame callbacks always land in [`Category::FRAME_CALLBACK`] without a
    /// token; they are cancelled by identity only.
    pub fn post_frame_callback_delayed(
        &self,
        callback: &FrameCallback,
        delay_millis: i64,
    ) -> SchedulerResult {
        self.post(
            Category::FRAME_CALLBACK,
            Payload::Frame(callback.clone()),
            None,
            delay_millis,
        )
    }

    /// Removes every queued entry in `category` matching both filters. A
    /// `None` filter matches anything. Returns the number of removed entries.
    pub fn remove_actions(
        &self,
        category: Category,
        action: Option<&Action>,
        token: Option<&Token>,
    ) -> usize {
        let removed = self.inner.lock().queues[category.index()]
            .remove_matching(action.map(Action::id), token);
        tracing::trace!("Removed {} {} entries", removed, category);
        removed
    }

    pub fn remove_frame_callback(&self, callback: &FrameCallback) -> usize {
        let removed = self.inner.lock().queues[Category::FRAME_CALLBACK.index()]
            .remove_matching(Some(callback.id()), None);
        tracing::trace!("Removed {} frame callbacks", removed);
        removed
    }

    pub fn frame_delay_nanos(&self) -> u64 {
        self.inner.lock().config.frame_delay_nanos
    }

    pub fn set_frame_delay_nanos(&self, nanos: u64) {
        self.inner.lock().config.frame_delay_nanos = nanos;
    }

    /// Timestamp of the frame currently being dispatched.
    pub fn current_frame_time_nanos(&self) -> SchedulerResult<u64> {
        self.inner
            .lock()
            .frame_time_nanos
            .ok_or(SchedulerError::NotDispatching)
    }

    /// Resolves with the timestamp of the next dispatched frame.
    pub fn next_frame(&self) -> NextFrame {
        NextFrame::new(self.clone())
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.lock().state
    }

    pub fn pending_count(&self, category: Category) -> usize {
        self.inner.lock().queues[category.index()].len()
    }

    pub fn has_pending(&self) -> bool {
        self.inner.lock().pending() > 0
    }

    pub fn nominal_period_nanos(&self) -> u64 {
        self.inner.tick_source.nominal_period_nanos()
    }

    pub fn stats(&self) -> SchedulerStats {
        let shared = self.inner.lock();
        SchedulerStats {
            pending: shared.pending(),
            ..shared.stats.clone()
        }
    }

    fn post(
        &self,
        category: Category,
        payload: Payload,
        token: Option<Token>,
        delay_millis: i64,
    ) -> SchedulerResult {
        let now = self.inner.clock.now_nanos();
        let due_time_nanos = now.saturating_add(delay_to_nanos(delay_millis));

        let (sequence, needs_tick) = {
            let mut shared = self.inner.lock();
            let sequence = shared.next_sequence;
            shared.next_sequence += 1;
            tracing::trace!(
                "Posting {} entry #{} due at {}",
                category,
                sequence,
                due_time_nanos
            );
            shared.queues[category.index()].insert(CallbackEntry {
                category,
                due_time_nanos,
                sequence,
                payload,
                token,
            });

            let needs_tick = shared.state == SchedulerState::Idle;
            if needs_tick {
                shared.state = SchedulerState::TickRequested;
            }
            (sequence, needs_tick)
        };

        if needs_tick {
            if let Err(e) = self.request_tick() {
                // A refused post leaves nothing behind
                self.inner.lock().queues[category.index()].remove_sequence(sequence);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Subscribes for the next tick. On failure the scheduler falls back to
    /// idle so a later post retries.
    fn request_tick(&self) -> SchedulerResult {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let result = self
            .inner
            .tick_source
            .request_tick(Box::new(move |frame_time_nanos| {
                if let Some(inner) = weak.upgrade() {
                    FrameScheduler { inner }.on_tick(frame_time_nanos);
                }
            }));

        if let Err(e) = result {
            let mut shared = self.inner.lock();
            if shared.state == SchedulerState::TickRequested {
                shared.state = SchedulerState::Idle;
            }
            return Err(e.into());
        }
        tracing::debug!("Tick requested");
        Ok(())
    }

    fn request_next_tick(&self) {
        if let Err(e) = self.request_tick() {
            tracing::warn!("Could not request the next tick: {}", e);
        }
    }

    /// Dispatch loop. Reached only through a tick subscription.
    pub(crate) fn on_tick(&self, frame_time_nanos: u64) {
        let now = self.inner.clock.now_nanos();
        let period = self.inner.tick_source.nominal_period_nanos();

        {
            let mut shared = self.inner.lock();
            if shared.state == SchedulerState::Dispatching {
                tracing::warn!("Ignoring tick delivered during dispatch");
                return;
            }

            if shared
                .last_frame_time_nanos
                .is_some_and(|last| frame_time_nanos < last)
            {
                tracing::debug!(
                    "Frame time {} went backwards, waiting for the next tick",
                    frame_time_nanos
                );
                if shared.pending() == 0 {
                    shared.state = SchedulerState::Idle;
                    return;
                }
                shared.state = SchedulerState::TickRequested;
                drop(shared);
                self.request_next_tick();
                return;
            }

            if period > 0 && now >= frame_time_nanos {
                let jitter = now - frame_time_nanos;
                if jitter >= period {
                    let skipped = jitter / period;
                    shared.stats.frames_skipped += skipped;
                    if skipped >= shared.config.skipped_frame_warning_limit {
                        tracing::info!(
                            "Skipped {} frames! The owning thread may be doing too much work.",
                            skipped
                        );
                    }
                }
            }

            shared.state = SchedulerState::Dispatching;
            shared.frame_time_nanos = Some(frame_time_nanos);
            shared.last_frame_time_nanos = Some(frame_time_nanos);
            shared.stats.frames_dispatched += 1;
        }

        let mut invoked = 0;
        let mut failed = 0;
        for category in Category::ALL {
            let due = self.inner.lock().queues[category.index()].extract_due(frame_time_nanos);
            for entry in due {
                invoked += 1;
                if let Err(failure) = invoke(&entry, frame_time_nanos) {
                    failed += 1;
                    (self.inner.error_handler)(&DispatchError {
                        category,
                        frame_time_nanos,
                        failure,
                    });
                }
            }
        }

        let needs_tick = {
            let mut shared = self.inner.lock();
            shared.frame_time_nanos = None;
            shared.stats.callbacks_invoked += invoked;
            shared.stats.callbacks_failed += failed;
            if shared.pending() == 0 {
                shared.state = SchedulerState::Idle;
                false
            } else {
                shared.state = SchedulerState::TickRequested;
                true
            }
        };

        tracing::trace!(
            "Frame {} ran {} callbacks ({} failed)",
            frame_time_nanos,
            invoked,
            failed
        );

        if needs_tick {
            self.request_next_tick();
        } else {
            tracing::debug!("All queues drained, going idle");
        }
    }
}

fn invoke(entry: &CallbackEntry, frame_time_nanos: u64) -> Result<(), CallbackFailure> {
    match panic::catch_unwind(AssertUnwindSafe(|| entry.payload.invoke(frame_time_nanos))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CallbackFailure::Error(e)),
        Err(payload) => Err(CallbackFailure::Panic(panic_message(payload.as_ref()))),
    }
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.lock();
        f.debug_struct("FrameScheduler")
            .field("state", &shared.state)
            .field("pending", &shared.pending())
            .field("frame_delay_nanos", &shared.config.frame_delay_nanos)
            .finish()
    }
}
