//! Predicate filter operator.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{BoxError, StreamError};
use crate::operator::OperatorCore;
use crate::protocol::{Publisher, Subscriber, Subscription};

/// Publisher forwarding only the upstream items matching a predicate.
///
/// Discarded items are not compensated with extra upstream demand: the
/// operator delivers fewer items than it receives, and a downstream that
/// needs a strict count issues more demand itself. A predicate `Err`
/// cancels the upstream and forwards the failure.
pub struct Select<T, P, F> {
    upstream: P,
    predicate: Arc<F>,
    _items: PhantomData<fn(T) -> T>,
}

impl<T, P, F> Select<T, P, F>
where
    T: Send + 'static,
    P: Publisher<T>,
    F: Fn(&T) -> Result<bool, BoxError> + Send + Sync + 'static,
{
    /// Creates a filtering operator over `upstream`.
    pub fn new(upstream: P, predicate: F) -> Self {
        Self {
            upstream,
            predicate: Arc::new(predicate),
            _items: PhantomData,
        }
    }
}

impl<T, P, F> Publisher<T> for Select<T, P, F>
where
    T: Send + 'static,
    P: Publisher<T>,
    F: Fn(&T) -> Result<bool, BoxError> + Send + Sync + 'static,
{
    fn subscribe<S: Subscriber<T> + 'static>(&self, subscriber: S) {
        self.upstream.subscribe(SelectProcessor {
            core: OperatorCore::new(Box::new(subscriber)),
            predicate: Arc::clone(&self.predicate),
        });
    }
}

struct SelectProcessor<T: Send + 'static, F> {
    core: OperatorCore<T>,
    predicate: Arc<F>,
}

impl<T, F> Subscriber<T> for SelectProcessor<T, F>
where
    T: Send + 'static,
    F: Fn(&T) -> Result<bool, BoxError> + Send + Sync + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.core.on_subscribe(subscription);
    }

    fn on_next(&self, item: T) {
        if self.core.cancelled() {
            return;
        }
        match (self.predicate)(&item) {
            Ok(true) => self.core.downstream().on_next(item),
            Ok(false) => {}
            Err(failure) => {
                self.core.cancel();
                self.core.on_error(StreamError::callback(failure));
            }
        }
    }

    fn on_error(&self, error: StreamError) {
        self.core.on_error(error);
    }

    fn on_complete(&self) {
        self.core.on_complete();
    }
}
