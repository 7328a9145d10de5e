//! One-to-one stream operators.
//!
//! An operator sits between an upstream publisher and a downstream
//! subscriber: demand and cancellation flow up, items and terminals flow
//! down, and the operator touches only the item path. The shared
//! plumbing lives in [`OperatorCore`]; concrete operators override item
//! handling alone.
//!
//! - [`Transform`]: one-to-one mapping with a fallible mapper.
//! - [`Select`]: predicate filter; discarded items are simply not
//!   delivered, no compensating upstream demand is issued.

pub mod select;
pub mod transform;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::error::StreamError;
use crate::protocol::{Subscriber, Subscription};

pub use select::Select;
pub use transform::Transform;

/// Shared state machine for a one-to-one operator.
///
/// Holds the type-erased downstream, the upstream subscription once the
/// handshake completes, and the cancellation/terminal flags. Processors
/// delegate every signal except `on_next` to this core.
pub(crate) struct OperatorCore<O> {
    downstream: Box<dyn Subscriber<O>>,
    upstream: OnceLock<Arc<dyn Subscription>>,
    cancelled: Arc<AtomicBool>,
    done: AtomicBool,
}

impl<O: Send + 'static> OperatorCore<O> {
    pub(crate) fn new(downstream: Box<dyn Subscriber<O>>) -> Self {
        Self {
            downstream,
            upstream: OnceLock::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            done: AtomicBool::new(false),
        }
    }

    /// Records the upstream subscription and forwards the handshake to
    /// the downstream subscriber through a demand-forwarding link.
    pub(crate) fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.upstream.set(Arc::clone(&subscription)).is_err() {
            // A second upstream handshake is a protocol violation by the
            // upstream; cancel the extra subscription and carry on.
            subscription.cancel();
            return;
        }
        self.downstream.on_subscribe(Arc::new(OperatorLink {
            upstream: subscription,
            cancelled: Arc::clone(&self.cancelled),
        }));
    }

    pub(crate) fn downstream(&self) -> &dyn Subscriber<O> {
        self.downstream.as_ref()
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Marks the operator cancelled and cancels upstream at most once.
    pub(crate) fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            if let Some(upstream) = self.upstream.get() {
                upstream.cancel();
            }
        }
    }

    /// Forwards a failure downstream, at most once.
    pub(crate) fn on_error(&self, error: StreamError) {
        if self.done.swap(true, Ordering::AcqRel) {
            debug!(%error, "error after terminal dropped");
            return;
        }
        self.downstream.on_error(error);
    }

    /// Forwards completion downstream, at most once.
    pub(crate) fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            debug!("completion after terminal dropped");
            return;
        }
        self.downstream.on_complete();
    }
}

/// Downstream-facing subscription of an operator.
///
/// Demand is forwarded upstream verbatim; cancellation sets the shared
/// flag so the processor stops forwarding items, then propagates upstream
/// once.
struct OperatorLink {
    upstream: Arc<dyn Subscription>,
    cancelled: Arc<AtomicBool>,
}

impl Subscription for OperatorLink {
    fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.upstream.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct FakeUpstream {
        requested: AtomicU64,
        cancels: AtomicU64,
    }

    impl FakeUpstream {
        fn new() -> Self {
            Self {
                requested: AtomicU64::new(0),
                cancels: AtomicU64::new(0),
            }
        }
    }

    impl Subscription for FakeUpstream {
        fn request(&self, n: u64) {
            self.requested.fetch_add(n, Ordering::SeqCst);
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_link_forwards_demand() {
        let upstream = Arc::new(FakeUpstream::new());
        let link = OperatorLink {
            upstream: Arc::clone(&upstream) as Arc<dyn Subscription>,
            cancelled: Arc::new(AtomicBool::new(false)),
        };

        link.request(5);
        link.request(7);
        assert_eq!(upstream.requested.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn test_link_cancels_upstream_once() {
        let upstream = Arc::new(FakeUpstream::new());
        let link = OperatorLink {
            upstream: Arc::clone(&upstream) as Arc<dyn Subscription>,
            cancelled: Arc::new(AtomicBool::new(false)),
        };

        link.cancel();
        link.cancel();
        link.cancel();
        assert_eq!(upstream.cancels.load(Ordering::SeqCst), 1);
    }
}
