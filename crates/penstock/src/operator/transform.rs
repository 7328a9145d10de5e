//! One-to-one mapping operator.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{BoxError, StreamError};
use crate::operator::OperatorCore;
use crate::protocol::{Publisher, Subscriber, Subscription};

/// Publisher applying a fallible mapper to every upstream item.
///
/// For each item: if the subscription is cancelled the item is dropped;
/// if the mapper returns `Err`, the upstream is cancelled and the error
/// is forwarded as [`StreamError::Callback`]; otherwise the mapped item
/// is forwarded. Demand and cancellation pass through untouched.
///
/// # Usage
///
/// ```rust,ignore
/// let labelled = Transform::new(source::from_items([1, 2, 3]), |n| {
///     Ok(format!("{n}:{}", n * 100))
/// });
/// ```
pub struct Transform<I, O, P, F> {
    upstream: P,
    mapper: Arc<F>,
    _items: PhantomData<fn(I) -> O>,
}

impl<I, O, P, F> Transform<I, O, P, F>
where
    I: Send + 'static,
    O: Send + 'static,
    P: Publisher<I>,
    F: Fn(I) -> Result<O, BoxError> + Send + Sync + 'static,
{
    /// Creates a mapping operator over `upstream`.
    pub fn new(upstream: P, mapper: F) -> Self {
        Self {
            upstream,
            mapper: Arc::new(mapper),
            _items: PhantomData,
        }
    }
}

impl<I, O, P, F> Publisher<O> for Transform<I, O, P, F>
where
    I: Send + 'static,
    O: Send + 'static,
    P: Publisher<I>,
    F: Fn(I) -> Result<O, BoxError> + Send + Sync + 'static,
{
    fn subscribe<S: Subscriber<O> + 'static>(&self, subscriber: S) {
        self.upstream.subscribe(TransformProcessor {
            core: OperatorCore::new(Box::new(subscriber)),
            mapper: Arc::clone(&self.mapper),
        });
    }
}

struct TransformProcessor<O: Send + 'static, F> {
    core: OperatorCore<O>,
    mapper: Arc<F>,
}

impl<I, O, F> Subscriber<I> for TransformProcessor<O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<O, BoxError> + Send + Sync + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.core.on_subscribe(subscription);
    }

    fn on_next(&self, item: I) {
        if self.core.cancelled() {
            return;
        }
        match (self.mapper)(item) {
            Ok(mapped) => self.core.downstream().on_next(mapped),
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
