//! Programmable source publisher with configurable backpressure.
//!
//! A tube bridges arbitrary producer code to a demand-driven subscriber:
//! the producer writes through a [`Tube`] handle (`send`, `fail`,
//! `complete`) from any thread, and the configured
//! [`BackpressureStrategy`] decides what happens to items sent while
//! downstream demand is zero.
//!
//! # Usage
//!
//! ```rust,ignore
//! use penstock::tube::{self, BackpressureStrategy, TubeConfiguration};
//!
//! let config = TubeConfiguration::builder()
//!     .backpressure(BackpressureStrategy::Buffer)
//!     .buffer_size(128)
//!     .build();
//!
//! let publisher = tube::create(config, |tube| {
//!     tube.when_terminated(|| release_resources());
//!     for event in events {
//!         tube.send(event);
//!     }
//!     tube.complete();
//! })?;
//! ```
//!
//! # Thread Safety
//!
//! Producer operations and the subscription's `request`/`cancel` only
//! mutate shared state and then try to enter the drain section, which a
//! single `wip` flag hands to exactly one thread at a time. On exit the
//! draining thread re-checks for work recorded while it held the flag,
//! so concurrent senders never lose an item and the downstream observes
//! a fully serialized signal sequence.

pub mod config;

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::demand::Demand;
use crate::error::StreamError;
use crate::protocol::{Publisher, Subscriber, Subscription};

pub use config::{BackpressureStrategy, TubeConfiguration, TubeConfigurationBuilder};

type TerminationCallback = Box<dyn FnOnce() + Send>;

/// Creates a tube publisher.
///
/// `producer` runs once per subscription, after `on_subscribe`, with a
/// fresh [`Tube`] handle. It may register callbacks and start sending
/// immediately; synchronous sends ahead of demand are subject to the
/// configured backpressure strategy.
///
/// # Errors
///
/// Returns [`StreamError::InvalidConfig`] for a bounded strategy with a
/// zero buffer size, before any subscriber is involved.
pub fn create<T, F>(
    config: TubeConfiguration,
    producer: F,
) -> Result<TubePublisher<T, F>, StreamError>
where
    T: Send + 'static,
    F: Fn(Tube<T>),
{
    config.validate()?;
    Ok(TubePublisher {
        config,
        producer,
        _item: PhantomData,
    })
}

/// Publisher driving a producer callback through a [`Tube`] handle per
/// subscription.
pub struct TubePublisher<T, F> {
    config: TubeConfiguration,
    producer: F,
    _item: PhantomData<fn() -> T>,
}

impl<T, F> Publisher<T> for TubePublisher<T, F>
where
    T: Send + 'static,
    F: Fn(Tube<T>),
{
    fn subscribe<S: Subscriber<T> + 'static>(&self, subscriber: S) {
        let state = Arc::new(TubeState {
            strategy: self.config.backpressure,
            capacity: self.config.buffer_size,
            demand: Demand::new(),
            queue: Mutex::new(VecDeque::new()),
            failed: Mutex::new(None),
            completing: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            wip: AtomicBool::new(false),
            downstream: Box::new(subscriber),
            on_cancel: Mutex::new(None),
            on_terminate: Mutex::new(None),
        });
        state.downstream.on_subscribe(Arc::new(TubeSubscription {
            state: Arc::clone(&state),
        }));
        (self.producer)(Tube { state });
    }
}

/// Producer-side handle for one tube subscription.
///
/// Clonable and usable from any thread. After a terminal signal or a
/// downstream cancellation every operation is a no-op.
pub struct Tube<T> {
    state: Arc<TubeState<T>>,
}

impl<T> Clone for Tube<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + 'static> Tube<T> {
    /// Sends an item downstream, subject to the backpressure strategy.
    pub fn send(&self, item: T) {
        let state = &self.state;
        if state.is_closed() {
            debug!("send after terminal dropped");
            return;
        }
        match state.strategy {
            BackpressureStrategy::Ignore | BackpressureStrategy::Unbounded => {
                state.queue.lock().push_back(item);
            }
            BackpressureStrategy::Buffer => {
                let mut queue = state.queue.lock();
                if queue.len() >= state.capacity {
                    drop(queue);
                    warn!(capacity = state.capacity, "tube buffer overflow");
                    state.record_failure(StreamError::Overflow {
                        capacity: state.capacity,
                    });
                    state.drain();
                    return;
                }
                queue.push_back(item);
            }
            BackpressureStrategy::Error => {
                // A zero-capacity buffer: any undemanded item overflows.
                if state.demand.get() == 0 {
                    warn!("tube received an item with no outstanding demand");
                    state.record_failure(StreamError::Overflow { capacity: 0 });
                    state.drain();
                    return;
                }
                state.queue.lock().push_back(item);
            }
            BackpressureStrategy::Drop => {
                if state.demand.get() == 0 {
                    debug!("item dropped: no outstanding demand");
                    return;
                }
                state.queue.lock().push_back(item);
            }
            BackpressureStrategy::Latest => {
                let mut queue = state.queue.lock();
                if queue.len() >= state.capacity {
                    queue.pop_front();
                    debug!("oldest buffered item evicted");
                }
                queue.push_back(item);
            }
        }
        state.drain();
    }

    /// Fails the stream. Buffered items are discarded and the error is
    /// signalled immediately.
    pub fn fail(&self, error: StreamError) {
        if self.state.is_closed() {
            debug!(%error, "failure after terminal dropped");
            return;
        }
        self.state.record_failure(error);
        self.state.drain();
    }

    /// Completes the stream. Buffered items drain first (as demand
    /// allows), then `on_complete` is signalled.
    pub fn complete(&self) {
        if self.state.is_closed() {
            return;
        }
        self.state.completing.store(true, Ordering::Release);
        self.state.drain();
    }

    /// Registers a callback invoked exactly once if the downstream
    /// cancels. Runs immediately when the cancellation already happened.
    pub fn when_cancelled(&self, callback: impl FnOnce() + Send + 'static) {
        let state = &self.state;
        *state.on_cancel.lock() = Some(Box::new(callback));
        if state.cancelled.load(Ordering::Acquire) {
            if state.terminated.load(Ordering::Acquire) {
                state.fire_cancel_callback();
            } else {
                state.drain();
            }
        }
    }

    /// Registers a callback invoked exactly once on any terminal
    /// outcome: completion, failure, or cancellation. Runs immediately
    /// when the tube already terminated.
    pub fn when_terminated(&self, callback: impl FnOnce() + Send + 'static) {
        let state = &self.state;
        *state.on_terminate.lock() = Some(Box::new(callback));
        if state.terminated.load(Ordering::Acquire) {
            state.fire_termination_callback();
        }
    }

    /// Returns the current outstanding demand. The value may be stale
    /// the instant it returns.
    #[must_use]
    pub fn requested(&self) -> u64 {
        self.state.demand.get()
    }

    /// Returns true once the downstream has cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Returns true once a terminal signal has been delivered or a
    /// cancellation processed.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state.terminated.load(Ordering::Acquire)
    }
}

struct TubeState<T> {
    strategy: BackpressureStrategy,
    capacity: usize,
    demand: Demand,
    queue: Mutex<VecDeque<T>>,
    /// Pending failure, delivered from inside the drain section.
    failed: Mutex<Option<StreamError>>,
    /// `complete()` was called; terminal fires once the buffer drains.
    completing: AtomicBool,
    /// Terminal delivered (or cancellation absorbed); absorbing state.
    terminated: AtomicBool,
    cancelled: AtomicBool,
    /// Drain-in-progress guard.
    wip: AtomicBool,
    downstream: Box<dyn Subscriber<T>>,
    on_cancel: Mutex<Option<TerminationCallback>>,
    on_terminate: Mutex<Option<TerminationCallback>>,
}

impl<T: Send + 'static> TubeState<T> {
    /// True once producers should treat the tube as settled.
    fn is_closed(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
            || self.cancelled.load(Ordering::Acquire)
            || self.completing.load(Ordering::Acquire)
            || self.failed.lock().is_some()
    }

    /// Records a failure unless one is already pending.
    fn record_failure(&self, error: StreamError) {
        let mut failed = self.failed.lock();
        if failed.is_none() {
            *failed = Some(error);
        }
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
        if self.terminated.load(Ordering::Acquire) {
            return;
        }
        if self.cancelled.load(Ordering::Acquire) {
            self.terminated.store(true, Ordering::Release);
            let discarded = {
                let mut queue = self.queue.lock();
                let n = queue.len();
                queue.clear();
                n
            };
            if discarded > 0 {
                debug!(discarded, "cancellation discarded buffered items");
            }
            self.fire_cancel_callback();
            self.fire_termination_callback();
            return;
        }
        let pending_failure = self.failed.lock().take();
        if let Some(error) = pending_failure {
            self.terminated.store(true, Ordering::Release);
            let discarded = {
                let mut queue = self.queue.lock();
                let n = queue.len();
                queue.clear();
                n
            };
            if discarded > 0 {
                debug!(discarded, "failure discarded buffered items");
            }
            self.downstream.on_error(error);
            self.fire_termination_callback();
            return;
        }

        loop {
            if self.cancelled.load(Ordering::Acquire) || self.failed.lock().is_some() {
                return;
            }
            let item = {
                let mut queue = self.queue.lock();
                if queue.is_empty() {
                    break;
                }
                let gated = self.strategy != BackpressureStrategy::Ignore;
                if gated && !self.demand.try_consume_one() {
                    return;
                }
                let Some(item) = queue.pop_front() else {
                    break;
                };
                item
            };
            self.downstream.on_next(item);
        }

        if self.completing.load(Ordering::Acquire) && self.queue.lock().is_empty() {
            self.terminated.store(true, Ordering::Release);
            self.downstream.on_complete();
            self.fire_termination_callback();
        }
    }

    /// Takes and runs the cancellation callback. The slot is emptied
    /// before the callback runs, so a callback that touches the tube
    /// cannot deadlock on its own slot.
    fn fire_cancel_callback(&self) {
        let callback = self.on_cancel.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Takes and runs the termination callback, outside the slot lock.
    fn fire_termination_callback(&self) {
        let callback = self.on_terminate.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn has_work(&self) -> bool {
        if self.terminated.load(Ordering::Acquire) {
            return false;
        }
        if self.cancelled.load(Ordering::Acquire) || self.failed.lock().is_some() {
            return true;
        }
        let buffered = self.queue.lock().len();
        if buffered == 0 {
            return self.completing.load(Ordering::Acquire);
        }
        match self.strategy {
            BackpressureStrategy::Ignore => true,
            _ => self.demand.get() > 0,
        }
    }
}

struct TubeSubscription<T> {
    state: Arc<TubeState<T>>,
}

impl<T: Send + 'static> Subscription for TubeSubscription<T> {
    fn request(&self, n: u64) {
        let state = &self.state;
        if state.terminated.load(Ordering::Acquire) || state.cancelled.load(Ordering::Acquire) {
            return;
        }
        if n == 0 {
            state.record_failure(StreamError::NonPositiveDemand);
        } else {
            state.demand.add(n);
        }
        state.drain();
    }

    fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.drain();
    }
}
