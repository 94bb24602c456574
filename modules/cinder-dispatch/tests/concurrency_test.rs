//! Multithreaded producers, concurrent pumps, and re-entrant subscribers.

mod support;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;

use cinder_dispatch::{Delivery, Dispatcher, EventKind, Scope, Subscriber};
use support::recording;

fn counter() -> (Arc<Subscriber>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let subscriber = Subscriber::from_fn(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (subscriber, count)
}

#[test]
fn concurrent_posts_then_one_pump_deliver_everything_once() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 250;

    let dispatcher = Dispatcher::default();
    let (a, count_a) = counter();
    let (b, count_b) = counter();
    dispatcher.register_callback(&a, EventKind(1), Scope::Primary);
    dispatcher.register_callback(&b, EventKind(2), Scope::Primary);

    thread::scope(|s| {
        for t in 0..THREADS {
            let dispatcher = &dispatcher;
            s.spawn(move || {
                let kind = EventKind(1 + (t % 2) as i32);
                for n in 0..PER_THREAD {
                    assert!(dispatcher.post_event(kind, &n.to_le_bytes()));
                }
            });
        }
    });

    let report = dispatcher.pump();
    assert_eq!(report.delivered, THREADS * PER_THREAD);
    assert_eq!(
        count_a.load(Ordering::SeqCst) + count_b.load(Ordering::SeqCst),
        THREADS * PER_THREAD
    );
    assert_eq!(count_a.load(Ordering::SeqCst), THREADS / 2 * PER_THREAD);
}

#[test]
fn posting_during_pumps_loses_and_duplicates_nothing() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 500;

    let dispatcher = Dispatcher::default();
    let (a, count) = counter();
    dispatcher.register_callback(&a, EventKind(1), Scope::Primary);
    let producing = AtomicBool::new(true);

    thread::scope(|s| {
        let dispatcher = &dispatcher;
        let producing = &producing;

        let pumper = s.spawn(move || {
            let mut delivered = 0;
            while producing.load(Ordering::SeqCst) {
                delivered += dispatcher.pump().delivered;
                thread::yield_now();
            }
            delivered
        });

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                s.spawn(move || {
                    for _ in 0..PER_PRODUCER {
                        dispatcher.post_event(EventKind(1), b"x");
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        producing.store(false, Ordering::SeqCst);

        let during = pumper.join().unwrap();
        let after = dispatcher.pump().delivered;
        assert_eq!(during + after, PRODUCERS * PER_PRODUCER);
    });

    assert_eq!(count.load(Ordering::SeqCst), PRODUCERS * PER_PRODUCER);
    assert_eq!(dispatcher.pending_len(), 0);
}

#[test]
fn concurrent_pumps_share_the_work() {
    const EVENTS: usize = 2_000;

    let dispatcher = Dispatcher::default();
    let (a, count) = counter();
    dispatcher.register_callback(&a, EventKind(1), Scope::Primary);
    for _ in 0..EVENTS {
        dispatcher.post_event(EventKind(1), b"x");
    }

    let total: usize = thread::scope(|s| {
        let dispatcher = &dispatcher;
        let pumps: Vec<_> = (0..4)
            .map(|_| s.spawn(move || dispatcher.pump().delivered))
            .collect();
        pumps.into_iter().map(|p| p.join().unwrap()).sum()
    });

    assert_eq!(total, EVENTS);
    assert_eq!(count.load(Ordering::SeqCst), EVENTS);
}

#[test]
fn concurrent_call_results_get_unique_handles() {
    let dispatcher = Dispatcher::default();
    let handles = Mutex::new(Vec::new());

    thread::scope(|s| {
        let dispatcher = &dispatcher;
        let handles = &handles;
        for _ in 0..8 {
            s.spawn(move || {
                let mine: Vec<_> = (0..200)
                    .map(|_| dispatcher.post_call_result(b"x", false))
                    .collect();
                handles.lock().unwrap().extend(mine);
            });
        }
    });

    let mut handles = handles.into_inner().unwrap();
    let total = handles.len();
    handles.sort();
    handles.dedup();
    assert_eq!(handles.len(), total);
    assert!(handles.iter().all(|h| h.is_valid()));
}

#[test]
fn subscriber_may_reenter_the_dispatcher() {
    let dispatcher = Arc::new(Dispatcher::default());
    let (follower, follower_log) = recording();

    // On its first event the leader registers a follower, posts an event for
    // it, pumps the freshly swapped-in queue, and unregisters itself.
    let weak: Weak<Dispatcher> = Arc::downgrade(&dispatcher);
    let follower_handle = Arc::clone(&follower);
    let this: Arc<Mutex<Option<Arc<Subscriber>>>> = Arc::new(Mutex::new(None));
    let this_inner = Arc::clone(&this);
    let leader = Subscriber::from_fn(move |delivery: Delivery<'_>| {
        let Some(dispatcher) = weak.upgrade() else {
            return;
        };
        assert_eq!(delivery.payload(), b"start");
        assert!(dispatcher.register_callback(&follower_handle, EventKind(2), Scope::Primary));
        assert!(dispatcher.post_event(EventKind(2), b"next"));
        dispatcher.pump();
        if let Some(me) = this_inner.lock().unwrap().take() {
            assert!(dispatcher.unregister_callback(&me));
        }
    });
    *this.lock().unwrap() = Some(Arc::clone(&leader));

    dispatcher.register_callback(&leader, EventKind(1), Scope::Primary);
    dispatcher.post_event(EventKind(1), b"start");

    // The nested pump inside the leader saw the follower's event.
    let report = dispatcher.pump();
    assert_eq!(report.delivered, 1);
    assert_eq!(follower_log.count(), 1);
    assert!(!leader.is_registered());
    assert!(follower.is_registered());

    dispatcher.post_event(EventKind(1), b"start");
    assert_eq!(dispatcher.pump().orphaned, 1);
}
