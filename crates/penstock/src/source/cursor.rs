//! Shared drain engine for pull-style publishers.
//!
//! Every in-memory source boils down to the same machine: a cursor over
//! some sequence, an outstanding-demand counter, a cancellation flag, and
//! a serialized drain loop that moves items from the cursor into
//! `on_next` while demand lasts. [`CursorPublisher`] owns the per-crate
//! implementation of that machine; the factories in [`super`] only differ
//! in how they build the cursor.
//!
//! # Thread Safety
//!
//! The drain section is guarded by a single `wip` flag: one thread at a
//! time drains, concurrent callers record their state change and leave.
//! On exit the draining thread re-checks for work that arrived while it
//! held the flag, so no request or cancellation is lost. A `request`
//! issued from inside `on_next` lands on the same guard and simply
//! extends the active drain instead of growing the stack.

use std::iter::Peekable;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::demand::Demand;
use crate::error::StreamError;
use crate::protocol::{NoopSubscription, Publisher, Subscriber, Subscription};

/// Cold publisher over a supplier of cursors.
///
/// The supplier runs once per subscription; a fresh cursor means a fresh
/// replay. A supplier error is surfaced as `on_subscribe` with a no-op
/// subscription followed immediately by `on_error`.
pub struct CursorPublisher<C, F> {
    supply: F,
    _cursor: std::marker::PhantomData<fn() -> C>,
}

impl<C, F> CursorPublisher<C, F> {
    pub(crate) fn new(supply: F) -> Self {
        Self {
            supply,
            _cursor: std::marker::PhantomData,
        }
    }
}

impl<C, F> Publisher<C::Item> for CursorPublisher<C, F>
where
    C: Iterator + Send + 'static,
    C::Item: Send + 'static,
    F: Fn() -> Result<C, StreamError>,
{
    fn subscribe<S: Subscriber<C::Item> + 'static>(&self, subscriber: S) {
        match (self.supply)() {
            Ok(cursor) => CursorSubscription::activate(cursor, subscriber),
            Err(error) => {
                subscriber.on_subscribe(Arc::new(NoopSubscription));
                subscriber.on_error(error);
            }
        }
    }
}

/// Per-subscription state for a cursor drain.
struct CursorSubscription<C: Iterator, S> {
    /// Cursor slot; dropped (set to `None`) on any terminal so resources
    /// held by the iterator are released promptly.
    cursor: Mutex<Option<Peekable<C>>>,
    demand: Demand,
    cancelled: AtomicBool,
    /// Terminal signal delivered (or cancellation absorbed).
    done: AtomicBool,
    /// Pending illegal-demand error, delivered inside the drain section
    /// so it never interleaves with an `on_next`.
    failed: Mutex<Option<StreamError>>,
    /// Drain-in-progress guard.
    wip: AtomicBool,
    downstream: S,
}

impl<C, S> CursorSubscription<C, S>
where
    C: Iterator + Send + 'static,
    C::Item: Send + 'static,
    S: Subscriber<C::Item> + 'static,
{
    fn activate(cursor: C, subscriber: S) {
        let subscription = Arc::new(Self {
            cursor: Mutex::new(Some(cursor.peekable())),
            demand: Demand::new(),
            cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
            failed: Mutex::new(None),
            wip: AtomicBool::new(false),
            downstream: subscriber,
        });
        subscription
            .downstream
            .on_subscribe(Arc::clone(&subscription) as Arc<dyn Subscription>);
        // An exhausted cursor completes without waiting for demand.
        subscription.drain();
    }

    fn drain(&self) {
        if self.wip.swap(true, Ordering::AcqRel) {
            return;
        }
        loop {
            self.drain_once();
            self.wip.store(false, Ordering::Release);
            if !self.has_work() {
                break;
            }
            if self.wip.swap(true, Ordering::AcqRel) {
                break;
            }
        }
    }

    fn drain_once(&self) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        if self.cancelled.load(Ordering::Acquire) {
            self.done.store(true, Ordering::Release);
            self.release_cursor();
            return;
        }
        let pending_failure = self.failed.lock().take();
        if let Some(error) = pending_failure {
            self.done.store(true, Ordering::Release);
            self.release_cursor();
            self.downstream.on_error(error);
            return;
        }

        loop {
            if self.cancelled.load(Ordering::Acquire) || self.failed.lock().is_some() {
                return;
            }
            let exhausted = {
                let mut guard = self.cursor.lock();
                match guard.as_mut() {
                    Some(cursor) => cursor.peek().is_none(),
                    None => return,
                }
            };
            if exhausted {
                self.done.store(true, Ordering::Release);
                self.release_cursor();
                self.downstream.on_complete();
                return;
            }
            if !self.demand.try_consume_one() {
                return;
            }
            let item = {
                let mut guard = self.cursor.lock();
                match guard.as_mut().and_then(Iterator::next) {
                    Some(item) => item,
                    None => return,
                }
            };
            self.downstream.on_next(item);
        }
    }

    fn has_work(&self) -> bool {
        if self.done.load(Ordering::Acquire) {
            return false;
        }
        if self.cancelled.load(Ordering::Acquire) || self.failed.lock().is_some() {
            return true;
        }
        if self.demand.get() == 0 {
            return false;
        }
        self.cursor.lock().is_some()
    }

    fn release_cursor(&self) {
        *self.cursor.lock() = None;
    }
}

impl<C, S> Subscription for CursorSubscription<C, S>
where
    C: Iterator + Send + 'static,
    C::Item: Send + 'static,
    S: Subscriber<C::Item> + 'static,
{
    fn request(&self, n: u64) {
        if self.done.load(Ordering::Acquire) {
            debug!(n, "request after terminal ignored");
            return;
        }
        if n == 0 {
            *self.failed.lock() = Some(StreamError::NonPositiveDemand);
        } else {
            self.demand.add(n);
        }
        self.drain();
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Probe;

    fn counting(n: i64) -> CursorPublisher<std::ops::Range<i64>, impl Fn() -> Result<std::ops::Range<i64>, StreamError>> {
        CursorPublisher::new(move || Ok(0..n))
    }

    // --- Drain protocol ---

    #[test]
    fn test_delivers_on_demand() {
        let publisher = counting(5);
        let probe = Probe::new();
        publisher.subscribe(probe.clone());

        assert_eq!(probe.items(), Vec::<i64>::new());
        probe.request(2);
        assert_eq!(probe.items(), vec![0, 1]);
        probe.request(2);
        assert_eq!(probe.items(), vec![0, 1, 2, 3]);
        assert!(!probe.is_terminated());

        probe.request(10);
        assert_eq!(probe.items(), vec![0, 1, 2, 3, 4]);
        assert!(probe.is_completed());
        probe.assert_trace_legal();
    }

    #[test]
    fn test_unbounded_demand_drains_everything() {
        let publisher = counting(100);
        let probe = Probe::unbounded();
        publisher.subscribe(probe.clone());

        assert_eq!(probe.next_count(), 100);
        assert!(probe.is_completed());
        probe.assert_trace_legal();
    }

    #[test]
    fn test_empty_cursor_completes_without_demand() {
        let publisher = counting(0);
        let probe = Probe::new();
        publisher.subscribe(probe.clone());

        assert!(probe.is_completed());
        assert_eq!(probe.next_count(), 0);
        probe.assert_trace_legal();
    }

    #[test]
    fn test_reentrant_request_does_not_recurse() {
        use crate::error::StreamError;
        use std::sync::atomic::AtomicUsize;

        // Requests one item at a time from inside on_next. With 50k
        // items, recursive delivery would overflow the stack; the drain
        // guard must flatten it into a loop.
        struct OneByOne {
            delivered: Arc<AtomicUsize>,
            completed: Arc<AtomicBool>,
            subscription: Mutex<Option<Arc<dyn Subscription>>>,
        }

        impl Subscriber<i64> for OneByOne {
            fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
                *self.subscription.lock() = Some(Arc::clone(&subscription));
                subscription.request(1);
            }

            fn on_next(&self, _item: i64) {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                let subscription = self.subscription.lock().clone();
                if let Some(subscription) = subscription {
                    subscription.request(1);
                }
            }

            fn on_error(&self, _error: StreamError) {}

            fn on_complete(&self) {
                self.completed.store(true, Ordering::Release);
            }
        }

        let delivered = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicBool::new(false));
        let publisher = counting(50_000);
        publisher.subscribe(OneByOne {
            delivered: Arc::clone(&delivered),
            completed: Arc::clone(&completed),
            subscription: Mutex::new(None),
        });

        assert_eq!(delivered.load(Ordering::Relaxed), 50_000);
        assert!(completed.load(Ordering::Acquire));
    }

    // --- Illegal demand ---

    #[test]
    fn test_request_zero_fails_subscription() {
        let publisher = counting(5);
        let probe = Probe::new();
        publisher.subscribe(probe.clone());

        probe.request(0);
        assert!(matches!(
            probe.error(),
            Some(StreamError::NonPositiveDemand)
        ));
        assert_eq!(probe.next_count(), 0);

        // Dead after the terminal.
        probe.request(10);
        assert_eq!(probe.next_count(), 0);
        probe.assert_trace_legal();
    }

    // --- Cancellation ---

    #[test]
    fn test_cancel_stops_delivery() {
        let publisher = counting(100);
        let probe = Probe::with_request(3);
        publisher.subscribe(probe.clone());
        assert_eq!(probe.next_count(), 3);

        probe.cancel();
        probe.request(50);
        assert_eq!(probe.next_count(), 3);
        assert!(!probe.is_terminated());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let publisher = counting(10);
        let probe = Probe::with_request(1);
        publisher.subscribe(probe.clone());

        for _ in 0..5 {
            probe.cancel();
        }
        assert_eq!(probe.next_count(), 1);
        assert!(!probe.is_terminated());
    }

    #[test]
    fn test_cancel_releases_cursor() {
        struct NoisyDrop(Arc<AtomicBool>);
        impl Iterator for NoisyDrop {
            type Item = i64;
            fn next(&mut self) -> Option<i64> {
                Some(1)
            }
        }
        impl Drop for NoisyDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::Release);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&dropped);
        let publisher = CursorPublisher::new(move || Ok(NoisyDrop(Arc::clone(&flag))));
        let probe = Probe::new();
        publisher.subscribe(probe.clone());

        assert!(!dropped.load(Ordering::Acquire));
        probe.cancel();
        assert!(dropped.load(Ordering::Acquire));
    }

    // --- Supplier failure ---

    #[test]
    fn test_supplier_error_is_signalled_after_on_subscribe() {
        let publisher = CursorPublisher::new(|| -> Result<std::ops::Range<i64>, StreamError> {
            Err(StreamError::supplier("no cursor today"))
        });
        let probe = Probe::unbounded();
        publisher.subscribe(probe.clone());

        assert!(matches!(probe.error(), Some(StreamError::Supplier(_))));
        assert_eq!(probe.next_count(), 0);
        probe.assert_trace_legal();
    }

    // --- Cold replay ---

    #[test]
    fn test_each_subscription_replays() {
        let publisher = counting(3);
        for _ in 0..3 {
            let probe = Probe::unbounded();
            publisher.subscribe(probe.clone());
            assert_eq!(probe.items(), vec![0, 1, 2]);
            assert!(probe.is_completed());
        }
    }

    // --- Concurrency ---

    #[test]
    fn test_concurrent_requests_deliver_exactly_once() {
        let publisher = counting(10_000);
        let probe = Probe::new();
        publisher.subscribe(probe.clone());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let p = probe.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..2500 {
                    p.request(1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(probe.next_count(), 10_000);
        assert!(probe.is_completed());
        let items = probe.items();
        for (i, item) in items.iter().enumerate() {
            assert_eq!(*item, i as i64);
        }
        probe.assert_trace_legal();
    }
}
