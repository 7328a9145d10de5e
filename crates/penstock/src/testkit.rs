//! Shared test subscriber that records every signal it observes.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StreamError;
use crate::protocol::{Subscriber, Subscription};

/// One observed signal.
#[derive(Debug)]
pub(crate) enum Signal<T> {
    Subscribed,
    Next(T),
    Error(StreamError),
    Complete,
}

struct ProbeInner<T> {
    signals: Mutex<Vec<Signal<T>>>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    /// Demand requested automatically inside `on_subscribe` (0 = none).
    auto_request: u64,
}

/// Recording subscriber. Clones share the same signal log, so a test can
/// hand one clone to a publisher and keep another for assertions.
pub(crate) struct Probe<T> {
    inner: Arc<ProbeInner<T>>,
}

impl<T> Clone for Probe<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Probe<T> {
    /// A probe that requests nothing on subscribe.
    pub(crate) fn new() -> Self {
        Self::with_request(0)
    }

    /// A probe that requests `n` items as soon as it is subscribed.
    pub(crate) fn with_request(n: u64) -> Self {
        Self {
            inner: Arc::new(ProbeInner {
                signals: Mutex::new(Vec::new()),
                subscription: Mutex::new(None),
                auto_request: n,
            }),
        }
    }

    /// An unbounded probe (`u64::MAX` demand on subscribe).
    pub(crate) fn unbounded() -> Self {
        Self::with_request(u64::MAX)
    }

    pub(crate) fn request(&self, n: u64) {
        let sub = self.inner.subscription.lock().clone();
        sub.expect("probe is not subscribed").request(n);
    }

    pub(crate) fn cancel(&self) {
        let sub = self.inner.subscription.lock().clone();
        sub.expect("probe is not subscribed").cancel();
    }

    pub(crate) fn error(&self) -> Option<StreamError> {
        self.inner.signals.lock().iter().find_map(|s| match s {
            Signal::Error(e) => Some(e.clone()),
            _ => None,
        })
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.inner
            .signals
            .lock()
            .iter()
            .any(|s| matches!(s, Signal::Complete))
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.inner
            .signals
            .lock()
            .iter()
            .any(|s| matches!(s, Signal::Complete | Signal::Error(_)))
    }

    pub(crate) fn next_count(&self) -> usize {
        self.inner
            .signals
            .lock()
            .iter()
            .filter(|s| matches!(s, Signal::Next(_)))
            .count()
    }

    /// Asserts the signal trace matches
    /// `on_subscribe (on_next)* (on_complete | on_error)?`.
    pub(crate) fn assert_trace_legal(&self) {
        let signals = self.inner.signals.lock();
        assert!(
            matches!(signals.first(), Some(Signal::Subscribed)),
            "first signal must be on_subscribe"
        );
        let mut terminated = false;
        for signal in signals.iter().skip(1) {
            assert!(!terminated, "signal observed after terminal");
            match signal {
                Signal::Subscribed => panic!("duplicate on_subscribe"),
                Signal::Next(_) => {}
                Signal::Error(_) | Signal::Complete => terminated = true,
            }
        }
    }
}

impl<T: Clone + Send + 'static> Probe<T> {
    pub(crate) fn items(&self) -> Vec<T> {
        self.inner
            .signals
            .lock()
            .iter()
            .filter_map(|s| match s {
                Signal::Next(item) => Some(item.clone()),
                _ => None,
            })
            .collect()
    }
}

impl<T: Send + 'static> Subscriber<T> for Probe<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.inner.signals.lock().push(Signal::Subscribed);
        *self.inner.subscription.lock() = Some(Arc::clone(&subscription));
        if self.inner.auto_request > 0 {
            subscription.request(self.inner.auto_request);
        }
    }

    fn on_next(&self, item: T) {
        self.inner.signals.lock().push(Signal::Next(item));
    }

    fn on_error(&self, error: StreamError) {
        self.inner.signals.lock().push(Signal::Error(error));
    }

    fn on_complete(&self) {
        self.inner.signals.lock().push(Signal::Complete);
    }
}
