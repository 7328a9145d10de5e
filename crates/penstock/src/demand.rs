//! Saturating atomic demand accounting.
//!
//! Demand is a `u64` counter shared between the subscriber side (which
//! adds via `request`) and the emitter side (which consumes one unit per
//! delivered item). `u64::MAX` is the effectively-infinite sentinel:
//! additions saturate there and saturated demand is never decremented,
//! so an unbounded subscriber pays no CAS per item.

use std::sync::atomic::{AtomicU64, Ordering};

/// Demand value treated as effectively infinite.
pub(crate) const UNBOUNDED: u64 = u64::MAX;

/// Shared outstanding-demand counter for one subscription.
#[derive(Debug, Default)]
pub(crate) struct Demand {
    count: AtomicU64,
}

impl Demand {
    pub(crate) fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    /// Adds `n` to the outstanding demand, saturating at [`UNBOUNDED`].
    ///
    /// Returns the demand observed before the addition.
    pub(crate) fn add(&self, n: u64) -> u64 {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return current;
            }
            let next = current.saturating_add(n);
            match self.count.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(prev) => return prev,
                Err(actual) => current = actual,
            }
        }
    }

    /// Attempts to consume one unit of demand.
    ///
    /// Returns `true` if a unit was available. Saturated demand is
    /// consumed without decrementing.
    pub(crate) fn try_consume_one(&self) -> bool {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            if current == UNBOUNDED {
                return true;
            }
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns the current outstanding demand snapshot.
    pub(crate) fn get(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}
