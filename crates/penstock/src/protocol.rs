//! Core publisher/subscriber protocol traits.
//!
//! These traits follow the Reactive Streams contract: a [`Publisher`]
//! produces items for exactly one [`Subscriber`] per subscription, items
//! flow only in response to demand signalled through the [`Subscription`]
//! handle, and every subscription observes the signal sequence
//! `on_subscribe (on_next)* (on_complete | on_error)?` with nothing after
//! the terminal.
//!
//! # Thread Safety
//!
//! Subscriber methods take `&self`: publishers may deliver signals from
//! any thread (one at a time per subscription), and a subscriber is free
//! to call [`Subscription::request`] from inside `on_next` on the same
//! call stack. Implementations use interior mutability for their own
//! state.

use std::sync::Arc;

use crate::error::StreamError;

/// Per-subscriber handle used to pull demand and cancel delivery.
///
/// `request` and `cancel` are safe to call from any thread, concurrently
/// with signal delivery.
pub trait Subscription: Send + Sync {
    /// Requests `n` more items from the publisher.
    ///
    /// Demand is additive and saturates at `u64::MAX`, which is treated
    /// as effectively infinite. Requesting `0` is a protocol violation:
    /// the publisher cancels the subscription and signals
    /// [`StreamError::NonPositiveDemand`].
    fn request(&self, n: u64);

    /// Cancels the subscription.
    ///
    /// Idempotent. At most one in-flight item may still be delivered
    /// after this returns; nothing afterwards.
    fn cancel(&self);
}

/// Consumer of a stream of items plus at most one terminal signal.
pub trait Subscriber<T>: Send + Sync {
    /// Called exactly once, before any other signal, with the
    /// subscription handle for this subscriber.
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    /// Called once per delivered item, never exceeding requested demand.
    fn on_next(&self, item: T);

    /// Terminal failure signal. No further signals follow.
    fn on_error(&self, error: StreamError);

    /// Terminal completion signal. No further signals follow.
    fn on_complete(&self);
}

/// Producer of a sequence of items for a single subscriber per
/// subscription.
///
/// Each `subscribe` call creates an independent subscription. Cold
/// publishers replay their sequence from the beginning for every
/// subscriber.
pub trait Publisher<T> {
    /// Subscribes `subscriber` to this publisher.
    ///
    /// The publisher calls `on_subscribe` before any other signal, even
    /// on immediate-failure paths.
    fn subscribe<S: Subscriber<T> + 'static>(&self, subscriber: S);
}

/// A subscription that ignores `request` and `cancel`.
///
/// Used when a publisher must honor the `on_subscribe`-first rule but
/// will signal a terminal immediately afterwards, such as a failed
/// supplier or a failure publisher.
pub struct NoopSubscription;

impl Subscription for NoopSubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}
