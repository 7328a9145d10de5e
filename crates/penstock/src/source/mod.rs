//! Cold in-memory source publishers.
//!
//! Every factory here produces a demand-driven publisher over data the
//! process already holds: fixed items, a cloneable iterable, a
//! single-shot cursor supplier, or a generator over supplied state. All
//! of them share the drain engine in [`cursor`], so they honor the same
//! protocol under any demand pattern: items flow only against requested
//! demand, exhaustion completes the subscription even at zero demand,
//! and `request(0)` fails the subscription.
//!
//! # Usage
//!
//! ```rust,ignore
//! use penstock::source;
//!
//! let numbers = source::from_items([1, 2, 3]);
//! numbers.subscribe(subscriber); // delivers 1, 2, 3, then completes
//!
//! // Single-shot cursors need a supplier so every subscription gets a
//! // fresh traversal.
//! let lines = source::from_stream(|| Ok(open_log()?.lines()));
//! ```
//!
//! The distinction between [`from_iterable`] and [`from_stream`] matters
//! for repeat subscriptions: an iterable is cloned per subscription,
//! while a stream supplier is re-invoked, which is the only sound way to
//! replay a cursor that can be traversed once.

pub mod cursor;

use std::sync::Arc;

use crate::error::{BoxError, StreamError};
use crate::protocol::{NoopSubscription, Publisher, Subscriber};

pub use cursor::CursorPublisher;

/// Creates a publisher replaying the given items to every subscriber.
///
/// The items are collected once; each subscription receives the whole
/// sequence in order, followed by completion.
pub fn from_items<T, I>(items: I) -> impl Publisher<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = T>,
{
    let items: Vec<T> = items.into_iter().collect();
    CursorPublisher::new(move || Ok(items.clone().into_iter()))
}

/// Creates a publisher from a cloneable iterable.
///
/// The iterable is cloned for every subscription, so the publisher is
/// cold: each subscriber observes the sequence from the beginning. This
/// assumes an in-memory, non-blocking iterator; do not wrap a cursor
/// that performs I/O per item.
pub fn from_iterable<I>(iterable: I) -> impl Publisher<<I::IntoIter as Iterator>::Item>
where
    I: IntoIterator + Clone,
    I::IntoIter: Send + 'static,
    <I::IntoIter as Iterator>::Item: Send + 'static,
{
    CursorPublisher::new(move || Ok(iterable.clone().into_iter()))
}

/// Creates a publisher from a supplier of single-shot cursors.
///
/// The supplier runs once per subscription. A supplier error is
/// delivered as `on_error` (after the mandatory `on_subscribe`) instead
/// of escaping to the caller of `subscribe`.
pub fn from_stream<C, F>(supplier: F) -> impl Publisher<C::Item>
where
    C: Iterator + Send + 'static,
    C::Item: Send + 'static,
    F: Fn() -> Result<C, BoxError>,
{
    CursorPublisher::new(move || supplier().map_err(StreamError::supplier))
}

/// Creates a publisher from a generator over supplied state.
///
/// `state_supplier` produces the initial state for each subscription and
/// `generator` turns that state into the subscription's cursor. A
/// generator that needs a nullable seed takes `Option<_>` as its state
/// type.
pub fn from_generator<S, C, FS, FG>(state_supplier: FS, generator: FG) -> impl Publisher<C::Item>
where
    C: Iterator + Send + 'static,
    C::Item: Send + 'static,
    FS: Fn() -> S,
    FG: Fn(S) -> C,
{
    CursorPublisher::new(move || Ok(generator(state_supplier())))
}

/// Creates a publisher that completes upon subscription without ever
/// delivering an item.
pub fn empty<T: Send + 'static>() -> impl Publisher<T> {
    CursorPublisher::new(|| Ok(std::iter::empty::<T>()))
}

/// Creates a publisher that fails every subscription with the given
/// error.
pub fn from_failure<T: Send + 'static>(error: StreamError) -> FailurePublisher<T> {
    FailurePublisher {
        error,
        _item: std::marker::PhantomData,
    }
}

/// Publisher that signals `on_error` immediately after `on_subscribe`.
///
/// The stored error is cloned per subscription, so every subscriber
/// observes the same failure.
pub struct FailurePublisher<T> {
    error: StreamError,
    _item: std::marker::PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Publisher<T> for FailurePublisher<T> {
    fn subscribe<S: Subscriber<T> + 'static>(&self, subscriber: S) {
        subscriber.on_subscribe(Arc::new(NoopSubscription));
        subscriber.on_error(self.error.clone());
    }
}
