//! # Penstock
//!
//! Demand-driven reactive streams for parallel-thread producers and
//! consumers.
//!
//! This crate provides:
//! - **Protocol**: [`Publisher`]/[`Subscriber`]/[`Subscription`] traits
//!   enforcing the reactive streams signal contract
//! - **Sources**: cold in-memory publishers over items, iterables,
//!   single-shot cursors, and generators
//! - **Operators**: one-to-one [`Transform`] (map) and [`Select`]
//!   (filter)
//! - **Completion bridge**: one-shot settlement cells adapted to and
//!   from publishers
//! - **Tube**: a programmable source applying a configurable
//!   backpressure strategy between arbitrary producer code and a
//!   demand-driven subscriber
//!
//! ## Design Principles
//!
//! 1. **No scheduler** - producers and consumers run on whatever threads
//!    the caller owns; nothing here blocks or spawns
//! 2. **Serialized signals** - each subscription delivers its signal
//!    sequence through a single-holder drain guard, never interleaved
//! 3. **Demand is law** - items move only against requested demand,
//!    except where a strategy documents otherwise
//! 4. **Errors are values** - failures travel through `on_error`, never
//!    across the producer boundary
//!
//! ## Example
//!
//! ```rust,ignore
//! use penstock::operator::{Select, Transform};
//! use penstock::source;
//!
//! let evens = Select::new(source::from_items([1, 2, 3, 4]), |n| Ok(n % 2 == 0));
//! let labelled = Transform::new(evens, |n| Ok(format!("#{n}")));
//! labelled.subscribe(my_subscriber); // "#2", "#4", complete
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod completion;
mod demand;
pub mod error;
pub mod operator;
pub mod protocol;
pub mod source;
pub mod tube;

#[cfg(test)]
pub(crate) mod testkit;

// Re-export key types
pub use completion::{from_completion, to_completion, Completion, CompletionWriter};
pub use error::{BoxError, StreamError};
pub use operator::{Select, Transform};
pub use protocol::{NoopSubscription, Publisher, Subscriber, Subscription};
pub use source::{empty, from_failure, from_generator, from_items, from_iterable, from_stream};
pub use tube::{create, BackpressureStrategy, Tube, TubeConfiguration};
