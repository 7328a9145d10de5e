//! One-shot settlement cells and their publisher bridges.
//!
//! [`Completion`] is a thread-safe, clonable cell that settles exactly
//! once with `Ok(value)` or `Err(error)`. Consumers observe the outcome
//! through a callback ([`Completion::on_settled`]), a non-blocking probe
//! ([`Completion::try_result`]), or by awaiting it: the cell implements
//! [`std::future::Future`], so it composes with whatever executor the
//! caller runs.
//!
//! Two bridges connect cells and publishers:
//!
//! - [`from_completion`]: a supplier of `Completion<Option<T>>` becomes a
//!   one-shot publisher. `Some(value)` delivers one item then completes,
//!   `None` completes empty, a failure is forwarded as `on_error`.
//! - [`to_completion`]: subscribes to a publisher, requests exactly one
//!   item, cancels after receiving it, and settles `Some(item)` /
//!   `None` / the upstream error, whichever happens first.
//!
//! # Thread Safety
//!
//! Settlement callbacks run on the settling thread, outside the state
//! lock. Cancelling a bridge subscription suppresses its signals but
//! never disturbs the cell, which may be shared with other observers.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::StreamError;
use crate::protocol::{Publisher, Subscriber, Subscription};

type SettleCallback<T> = Box<dyn FnOnce(Result<T, StreamError>) + Send>;

enum CellState<T> {
    Pending {
        callbacks: Vec<SettleCallback<T>>,
        wakers: Vec<Waker>,
    },
    Settled(Result<T, StreamError>),
}

/// A clonable cell that settles exactly once.
pub struct Completion<T> {
    cell: Arc<Mutex<CellState<T>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

/// Producer side of a pending [`Completion`]. Settles the cell at most
/// once; later settlements lose and are dropped.
pub struct CompletionWriter<T> {
    cell: Arc<Mutex<CellState<T>>>,
}

impl<T: Clone + Send + 'static> Completion<T> {
    /// Creates a pending cell, returning the writer and the cell.
    #[must_use]
    pub fn pending() -> (CompletionWriter<T>, Self) {
        let cell = Arc::new(Mutex::new(CellState::Pending {
            callbacks: Vec::new(),
            wakers: Vec::new(),
        }));
        (
            CompletionWriter {
                cell: Arc::clone(&cell),
            },
            Self { cell },
        )
    }

    /// Creates a cell already settled with `value`.
    #[must_use]
    pub fn settled(value: T) -> Self {
        Self {
            cell: Arc::new(Mutex::new(CellState::Settled(Ok(value)))),
        }
    }

    /// Creates a cell already settled with a failure.
    #[must_use]
    pub fn failed(error: StreamError) -> Self {
        Self {
            cell: Arc::new(Mutex::new(CellState::Settled(Err(error)))),
        }
    }

    /// Registers a callback invoked exactly once with the outcome.
    ///
    /// Runs immediately on the calling thread if the cell has already
    /// settled, otherwise on the settling thread.
    pub fn on_settled(&self, callback: impl FnOnce(Result<T, StreamError>) + Send + 'static) {
        let outcome = {
            let mut state = self.cell.lock();
            match &mut *state {
                CellState::Pending { callbacks, .. } => {
                    callbacks.push(Box::new(callback));
                    return;
                }
                CellState::Settled(outcome) => outcome.clone(),
            }
        };
        callback(outcome);
    }

    /// Returns the outcome if the cell has settled.
    #[must_use]
    pub fn try_result(&self) -> Option<Result<T, StreamError>> {
        match &*self.cell.lock() {
            CellState::Pending { .. } => None,
            CellState::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// Returns true once the cell has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(&*self.cell.lock(), CellState::Settled(_))
    }
}

impl<T: Clone + Send + 'static> CompletionWriter<T> {
    /// Settles the cell with a value. Loses silently if already settled.
    pub fn complete(self, value: T) {
        settle(&self.cell, Ok(value));
    }

    /// Settles the cell with a failure. Loses silently if already
    /// settled.
    pub fn fail(self, error: StreamError) {
        settle(&self.cell, Err(error));
    }
}

fn settle<T: Clone>(cell: &Mutex<CellState<T>>, outcome: Result<T, StreamError>) {
    let (callbacks, wakers) = {
        let mut state = cell.lock();
        match &*state {
            CellState::Settled(_) => {
                debug!("late settlement dropped");
                return;
            }
            CellState::Pending { .. } => {
                match std::mem::replace(&mut *state, CellState::Settled(outcome.clone())) {
                    CellState::Pending { callbacks, wakers } => (callbacks, wakers),
                    CellState::Settled(_) => unreachable!("checked pending above"),
                }
            }
        }
    };
    for callback in callbacks {
        callback(outcome.clone());
    }
    for waker in wakers {
        waker.wake();
    }
}

impl<T: Clone + Send + 'static> Future for Completion<T> {
    type Output = Result<T, StreamError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.cell.lock();
        match &mut *state {
            CellState::Settled(outcome) => Poll::Ready(outcome.clone()),
            CellState::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Completion -> Publisher
// ---------------------------------------------------------------------------

/// Creates a one-shot publisher from a supplier of settlement cells.
///
/// The supplier runs once per subscription. The settlement callback is
/// attached on the first positive request, so nothing is delivered ahead
/// of demand. Cancellation before settlement suppresses all signals
/// without disturbing the cell.
pub fn from_completion<T, F>(supplier: F) -> CompletionPublisher<T, F>
where
    T: Clone + Send + 'static,
    F: Fn() -> Completion<Option<T>>,
{
    CompletionPublisher {
        supplier,
        _item: PhantomData,
    }
}

/// Publisher over a supplier of `Completion<Option<T>>` cells.
pub struct CompletionPublisher<T, F> {
    supplier: F,
    _item: PhantomData<fn() -> T>,
}

impl<T, F> Publisher<T> for CompletionPublisher<T, F>
where
    T: Clone + Send + 'static,
    F: Fn() -> Completion<Option<T>>,
{
    fn subscribe<S: Subscriber<T> + 'static>(&self, subscriber: S) {
        let inner = Arc::new(CompletionInner {
            cell: (self.supplier)(),
            downstream: subscriber,
            state: AtomicU8::new(IDLE),
        });
        inner
            .downstream
            .on_subscribe(Arc::new(CompletionSubscription {
                inner: Arc::clone(&inner),
            }));
    }
}

const IDLE: u8 = 0;
const ARMED: u8 = 1;
const TERMINATED: u8 = 2;
const CANCELLED: u8 = 3;

struct CompletionInner<T, S> {
    cell: Completion<Option<T>>,
    downstream: S,
    state: AtomicU8,
}

struct CompletionSubscription<T, S> {
    inner: Arc<CompletionInner<T, S>>,
}

impl<T, S> CompletionInner<T, S>
where
    T: Clone + Send + 'static,
    S: Subscriber<T> + 'static,
{
    fn settle_downstream(&self, outcome: Result<Option<T>, StreamError>) {
        if self
            .state
            .compare_exchange(ARMED, TERMINATED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Cancelled or already terminated; the cell may be shared,
            // so the outcome is simply not ours to deliver.
            return;
        }
        match outcome {
            Ok(Some(value)) => {
                self.downstream.on_next(value);
                self.downstream.on_complete();
            }
            Ok(None) => self.downstream.on_complete(),
            Err(error) => self.downstream.on_error(error),
        }
    }
}

impl<T, S> Subscription for CompletionSubscription<T, S>
where
    T: Clone + Send + 'static,
    S: Subscriber<T> + 'static,
{
    fn request(&self, n: u64) {
        let inner = &self.inner;
        if n == 0 {
            let mut current = inner.state.load(Ordering::Acquire);
            while current == IDLE || current == ARMED {
                match inner.state.compare_exchange_weak(
                    current,
                    TERMINATED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        inner.downstream.on_error(StreamError::NonPositiveDemand);
                        return;
                    }
                    Err(actual) => current = actual,
                }
            }
            return;
        }
        if inner
            .state
            .compare_exchange(IDLE, ARMED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Extra demand for a single-valued source is a no-op.
            return;
        }
        // Deliver on settlement; immediately if the cell already settled.
        let target = Arc::clone(inner);
        inner
            .cell
            .on_settled(move |outcome| target.settle_downstream(outcome));
    }

    fn cancel(&self) {
        let mut current = self.inner.state.load(Ordering::Acquire);
        while current == IDLE || current == ARMED {
            match self.inner.state.compare_exchange_weak(
                current,
                CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Publisher -> Completion
// ---------------------------------------------------------------------------

/// Subscribes to `publisher`, requests exactly one item, and returns a
/// cell settling with `Some(first item)`, `None` on empty completion, or
/// the upstream failure, whichever arrives first. The subscription is
/// cancelled as soon as the first item lands.
pub fn to_completion<T, P>(publisher: &P) -> Completion<Option<T>>
where
    T: Clone + Send + 'static,
    P: Publisher<T>,
{
    let (writer, completion) = Completion::pending();
    publisher.subscribe(FirstItemSubscriber {
        writer: Mutex::new(Some(writer)),
        subscription: Mutex::new(None),
    });
    completion
}

struct FirstItemSubscriber<T> {
    writer: Mutex<Option<CompletionWriter<Option<T>>>>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
}

impl<T: Clone + Send + 'static> Subscriber<T> for FirstItemSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        *self.subscription.lock() = Some(Arc::clone(&subscription));
        subscription.request(1);
    }

    fn on_next(&self, item: T) {
        let Some(writer) = self.writer.lock().take() else {
            return;
        };
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
        writer.complete(Some(item));
    }

    fn on_error(&self, error: StreamError) {
        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            writer.fail(error);
        }
    }

    fn on_complete(&self) {
        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            writer.complete(None);
        }
    }
}
