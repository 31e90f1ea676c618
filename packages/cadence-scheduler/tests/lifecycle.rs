use cadence_scheduler::{
    Action, Category, FrameCallback, FrameScheduler, ManualClock, ManualTickSource,
    SchedulerConfig, SchedulerError, SchedulerState, TickSourceError, Token,
};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

const PERIOD: u64 = 16_666_667;

fn harness() -> (FrameScheduler, ManualClock, ManualTickSource) {
    let clock = ManualClock::new(0);
    let ticks = ManualTickSource::new(PERIOD);
    let scheduler = FrameScheduler::new(ticks.clone(), clock.clone());
    (scheduler, clock, ticks)
}

#[test]
fn test_subscribes_lazily() {
    let (scheduler, clock, ticks) = harness();

    // Initially idle
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert!(!ticks.has_pending_request());

    scheduler
        .post_action(Category::Input, &Action::new(|| {}), None)
        .unwrap();
    scheduler
        .post_action(Category::Commit, &Action::new(|| {}), None)
        .unwrap();

    // Two posts, one subscription
    assert_eq!(scheduler.state(), SchedulerState::TickRequested);
    assert_eq!(ticks.request_count(), 1);

    ticks.fire(clock.advance(PERIOD));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert!(!ticks.has_pending_request());
    assert_eq!(ticks.request_count(), 1);
}

#[test]
fn test_resubscribes_while_work_is_delayed() {
    let (scheduler, clock, ticks) = harness();

    scheduler
        .post_action_delayed(Category::Animation, &Action::new(|| {}), None, 100)
        .unwrap();

    ticks.fire(clock.advance(PERIOD));
    assert_eq!(scheduler.state(), SchedulerState::TickRequested);
    assert!(ticks.has_pending_request());
    assert_eq!(scheduler.pending_count(Category::Animation), 1);
}

#[test]
fn test_post_during_dispatch_lands_in_later_category_same_frame() {
    let (scheduler, clock, ticks) = harness();
    let log = Arc::new(Mutex::new(Vec::new()));

    let traversal = {
        let log = log.clone();
        Action::new(move || log.lock().unwrap().push("traversal"))
    };
    let input = {
        let log = log.clone();
        let scheduler = scheduler.clone();
        Action::new(move || {
            log.lock().unwrap().push("input");
            scheduler.post_action(Category::Traversal, &traversal, None).unwrap();
        })
    };

    scheduler.post_action(Category::Input, &input, None).unwrap();
    ticks.fire(clock.advance(PERIOD));

    assert_eq!(*log.lock().unwrap(), vec!["input", "traversal"]);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[test]
fn test_reposted_frame_callback_runs_next_frame() {
    let (scheduler, clock, ticks) = harness();
    let frames = Arc::new(Mutex::new(Vec::new()));

    fn post_counter(scheduler: &FrameScheduler, frames: Arc<Mutex<Vec<u64>>>, remaining: u32) {
        let next = scheduler.clone();
        let callback = FrameCallback::new(move |t| {
            frames.lock().unwrap().push(t);
            if remaining > 1 {
                post_counter(&next, frames.clone(), remaining - 1);
            }
        });
        scheduler.post_frame_callback(&callback).unwrap();
    }

    post_counter(&scheduler, frames.clone(), 3);

    let mut expected = Vec::new();
    for _ in 0..3 {
        let t = clock.advance(PERIOD);
        expected.push(t);
        assert!(ticks.fire(t));
    }

    assert_eq!(*frames.lock().unwrap(), expected);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[test]
fn test_backwards_tick_is_not_dispatched() {
    let (scheduler, clock, ticks) = harness();
    let count = Arc::new(Mutex::new(0));
    let action = {
        let count = count.clone();
        Action::new(move || *count.lock().unwrap() += 1)
    };

    scheduler
        .post_action(Category::Input, &Action::new(|| {}), None)
        .unwrap();
    let first = clock.advance(2 * PERIOD);
    ticks.fire(first);

    scheduler.post_action(Category::Input, &action, None).unwrap();
    ticks.fire(first - PERIOD);
    assert_eq!(*count.lock().unwrap(), 0);
    assert!(ticks.has_pending_request());

    ticks.fire(clock.advance(PERIOD));
    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn test_backwards_tick_with_nothing_queued_goes_idle() {
    let (scheduler, clock, ticks) = harness();
    let action = Action::new(|| {});

    scheduler.post_action(Category::Input, &action, None).unwrap();
    let first = clock.advance(2 * PERIOD);
    ticks.fire(first);

    // Queue something, cancel it, then deliver a stale timestamp
    scheduler.post_action(Category::Input, &action, None).unwrap();
    assert_eq!(scheduler.remove_actions(Category::Input, Some(&action), None), 1);
    assert!(ticks.fire(first - PERIOD));

    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert!(!ticks.has_pending_request());
    assert_eq!(ticks.request_count(), 2);
}

#[test]
fn test_frame_time_only_visible_during_dispatch() {
    let (scheduler, clock, ticks) = harness();
    let observed = Arc::new(Mutex::new(None));

    assert_eq!(
        scheduler.current_frame_time_nanos(),
        Err(SchedulerError::NotDispatching)
    );

    let action = {
        let observed = observed.clone();
        let scheduler = scheduler.clone();
        Action::new(move || {
            *observed.lock().unwrap() = scheduler.current_frame_time_nanos().ok();
        })
    };
    scheduler.post_action(Category::Commit, &action, None).unwrap();

    let t = clock.advance(PERIOD);
    ticks.fire(t);
    assert_eq!(*observed.lock().unwrap(), Some(t));
    assert!(scheduler.current_frame_time_nanos().is_err());
}

#[test]
fn test_frame_delay_round_trip() {
    let ticks = ManualTickSource::new(PERIOD);
    let scheduler = FrameScheduler::builder(ticks)
        .with_config(SchedulerConfig {
            frame_delay_nanos: 4_000_000,
            ..SchedulerConfig::default()
        })
        .build();

    assert_eq!(scheduler.frame_delay_nanos(), 4_000_000);
    scheduler.set_frame_delay_nanos(2_000_000);
    assert_eq!(scheduler.frame_delay_nanos(), 2_000_000);
}

#[test]
fn test_closed_tick_source_rejects_post_without_queueing() {
    let (scheduler, clock, ticks) = harness();
    let count = Arc::new(Mutex::new(0));
    let action = {
        let count = count.clone();
        Action::new(move || *count.lock().unwrap() += 1)
    };

    ticks.close();
    let err = scheduler.post_action(Category::Input, &action, None).unwrap_err();
    assert_eq!(err, SchedulerError::TickSource(TickSourceError::Closed));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert_eq!(scheduler.pending_count(Category::Input), 0);

    // Retrying against the same closed source must not pile up entries
    assert!(scheduler.post_action(Category::Input, &action, None).is_err());
    assert!(scheduler.post_action(Category::Input, &action, None).is_err());
    assert!(!scheduler.has_pending());
    assert_eq!(scheduler.stats().pending, 0);
    assert!(!ticks.fire(clock.advance(PERIOD)));
    assert_eq!(*count.lock().unwrap(), 0);
}

#[test]
fn test_skipped_frames_are_counted() {
    let (scheduler, clock, ticks) = harness();

    scheduler
        .post_action(Category::Input, &Action::new(|| {}), None)
        .unwrap();
    let frame_time = clock.advance(PERIOD);
    // Dispatch starts three and a half periods after the tick was stamped
    clock.advance(3 * PERIOD + PERIOD / 2);
    ticks.fire(frame_time);

    let stats = scheduler.stats();
    assert_eq!(stats.frames_skipped, 3);
    assert_eq!(stats.frames_dispatched, 1);
    assert_eq!(stats.callbacks_invoked, 1);
    assert_eq!(stats.pending, 0);
}

#[test]
fn test_posting_from_other_threads() {
    let (scheduler, clock, ticks) = harness();
    let count = Arc::new(Mutex::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = scheduler.clone();
            let count = count.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    let count = count.clone();
                    scheduler
                        .post_action(
                            Category::Animation,
                            &Action::new(move || *count.lock().unwrap() += 1),
                            None,
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(scheduler.pending_count(Category::Animation), 100);
    assert_eq!(ticks.request_count(), 1);
    ticks.fire(clock.advance(PERIOD));
    assert_eq!(*count.lock().unwrap(), 100);
    assert!(!scheduler.has_pending());
}

#[test]
fn test_dropped_scheduler_ignores_late_tick() {
    let (scheduler, clock, ticks) = harness();
    scheduler
        .post_action(Category::Input, &Action::new(|| {}), None)
        .unwrap();
    drop(scheduler);

    // The subscription holds only a weak reference
    assert!(ticks.fire(clock.advance(PERIOD)));
    assert!(!ticks.has_pending_request());
}

#[test]
fn test_concurrent_remove_and_dispatch_never_double_count() {
    const ENTRIES: usize = 2_000;

    let (scheduler, clock, ticks) = harness();
    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..ENTRIES).map(|_| AtomicUsize::new(0)).collect());
    let done = Arc::new(AtomicBool::new(false));

    let poster = {
        let scheduler = scheduler.clone();
        let runs = runs.clone();
        thread::spawn(move || {
            let mut removed = vec![0; ENTRIES];
            for (i, slot) in removed.iter_mut().enumerate() {
                let token = Token::new("race");
                let action = {
                    let runs = runs.clone();
                    Action::new(move || {
                        runs[i].fetch_add(1, Ordering::SeqCst);
                    })
                };
                scheduler
                    .post_action(Category::Animation, &action, Some(&token))
                    .unwrap();
                if i % 3 != 0 {
                    thread::yield_now();
                    *slot = scheduler.remove_actions(Category::Animation, None, Some(&token));
                }
            }
            removed
        })
    };

    let ticker = {
        let clock = clock.clone();
        let ticks = ticks.clone();
        let done = done.clone();
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                ticks.fire(clock.advance(PERIOD));
                thread::yield_now();
            }
        })
    };

    let removed = poster.join().unwrap();
    done.store(true, Ordering::SeqCst);
    ticker.join().unwrap();

    // Flush whatever the ticker left behind
    ticks.fire(clock.advance(PERIOD));
    assert!(!scheduler.has_pending());

    for (i, removed) in removed.iter().enumerate() {
        let ran = runs[i].load(Ordering::SeqCst);
        assert!(ran <= 1, "entry {} ran {} times", i, ran);
        assert!(*removed <= 1, "entry {} removed {} times", i, removed);
        assert_eq!(ran + removed, 1, "entry {} ran {} and was removed {}", i, ran, removed);
    }
}
