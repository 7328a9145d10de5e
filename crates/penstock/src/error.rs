//! Error types for stream signals and construction.
//!
//! A single [`StreamError`] enum covers every failure a subscription can
//! observe. Errors travel through `on_error` by value, and a failure
//! publisher replays the same error to every subscriber, so the enum is
//! `Clone`, with foreign causes held behind `Arc`.

use std::sync::Arc;

/// Boxed error type accepted from user callbacks and suppliers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for stream operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// `request` was called with zero demand. Demand must be strictly
    /// positive; the offending subscription is cancelled.
    #[error("demand must be strictly positive")]
    NonPositiveDemand,

    /// Invalid tube configuration, reported before any subscriber is
    /// invoked.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bounded buffer was exceeded under the `Buffer` or `Error`
    /// backpressure strategy.
    #[error("buffer overflow: capacity {capacity} exceeded")]
    Overflow {
        /// Configured buffer capacity at the time of overflow.
        capacity: usize,
    },

    /// A stream or completion supplier failed to produce a cursor.
    #[error("supplier failed: {0}")]
    Supplier(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// A user-provided mapper or predicate returned an error.
    #[error("user callback failed: {0}")]
    Callback(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// An application-level failure injected into the stream.
    #[error("{0}")]
    Failure(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl StreamError {
    /// Wraps a supplier failure.
    #[must_use]
    pub fn supplier(error: impl Into<BoxError>) -> Self {
        Self::Supplier(Arc::from(error.into()))
    }

    /// Wraps a user callback failure.
    #[must_use]
    pub fn callback(error: impl Into<BoxError>) -> Self {
        Self::Callback(Arc::from(error.into()))
    }

    /// Wraps an application failure for injection via a failure publisher.
    #[must_use]
    pub fn failure(error: impl Into<BoxError>) -> Self {
        Self::Failure(Arc::from(error.into()))
    }

    /// Returns true if this is a buffer overflow error.
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }

    /// Returns true if this error was raised for non-positive demand.
    #[must_use]
    pub fn is_non_positive_demand(&self) -> bool {
        matches!(self, Self::NonPositiveDemand)
    }

    /// Returns true if this error originated in a user callback.
    #[must_use]
    pub fn is_callback(&self) -> bool {
        matches!(self, Self::Callback(_))
    }
}
