use crate::callback::FrameCallback;
use crate::error::SchedulerResult;
use crate::scheduler::FrameScheduler;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

#[derive(Default)]
struct NextFrameState {
    time: Option<u64>,
    waker: Option<Waker>,
}

/// Future returned by [`FrameScheduler::next_frame`].
///
/// The frame callback is posted on first poll. Dropping the future before it
/// resolves removes the callback again.
pub struct NextFrame {
    scheduler: FrameScheduler,
    state: Arc<Mutex<NextFrameState>>,
    callback: Option<FrameCallback>,
}

impl NextFrame {
    pub(crate) fn new(scheduler: FrameScheduler) -> Self {
        Self {
            scheduler,
            state: Arc::new(Mutex::new(NextFrameState::default())),
            callback: None,
        }
    }
}

impl Future for NextFrame {
    type Output = SchedulerResult<u64>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        {
            let mut state = this.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(time) = state.time {
                return Poll::Ready(Ok(time));
            }
            state.waker = Some(cx.waker().clone());
        }

        if this.callback.is_none() {
            let state = Arc::downgrade(&this.state);
            let callback = FrameCallback::new(move |time| {
                let Some(state) = state.upgrade() else {
                    return;
                };
                let waker = {
                    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    state.time = Some(time);
                    state.waker.take()
                };
                if let Some(waker) = waker {
                    waker.wake();
                }
            });
            if let Err(e) = this.scheduler.post_frame_callback(&callback) {
                return Poll::Ready(Err(e));
            }
            this.callback = Some(callback);
        }

        Poll::Pending
    }
}

impl Drop for NextFrame {
    fn drop(&mut self) {
        let fired = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .time
            .is_some();
        if let Some(callback) = self.callback.take() {
            if !fired {
                self.scheduler.remove_frame_callback(&callback);
            }
        }
    }
}
