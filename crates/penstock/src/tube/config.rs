//! Tube configuration types.

use crate::error::StreamError;

/// Default buffer capacity for the `Buffer` and `Latest` strategies.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Policy applied when a producer sends faster than downstream demand
/// allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureStrategy {
    /// Queue up to `buffer_size` undemanded items; overflow fails the
    /// stream with [`StreamError::Overflow`].
    #[default]
    Buffer,

    /// Silently discard items sent while demand is zero.
    Drop,

    /// Fail the stream immediately when an item arrives with no
    /// outstanding demand.
    Error,

    /// Keep a sliding window of the most recent `buffer_size` items,
    /// evicting the oldest on overflow.
    Latest,

    /// Deliver every item immediately, ignoring downstream demand
    /// entirely. This knowingly breaks the demand rule of the reactive
    /// streams contract; use it only when the subscriber is effectively
    /// infinitely fast.
    Ignore,

    /// Queue undemanded items without bound. Memory is the only limit.
    Unbounded,
}

impl BackpressureStrategy {
    /// Returns true if the strategy requires a strictly positive buffer
    /// capacity.
    #[must_use]
    pub fn is_bounded(self) -> bool {
        matches!(self, Self::Buffer | Self::Latest)
    }
}

/// Configuration for a tube publisher.
///
/// ```rust,ignore
/// let config = TubeConfiguration::builder()
///     .backpressure(BackpressureStrategy::Latest)
///     .buffer_size(64)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TubeConfiguration {
    /// Backpressure strategy applied to undemanded sends.
    pub backpressure: BackpressureStrategy,

    /// Buffer capacity; meaningful only for [`BackpressureStrategy::Buffer`]
    /// and [`BackpressureStrategy::Latest`].
    pub buffer_size: usize,
}

impl Default for TubeConfiguration {
    fn default() -> Self {
        Self {
            backpressure: BackpressureStrategy::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl TubeConfiguration {
    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> TubeConfigurationBuilder {
        TubeConfigurationBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidConfig`] when a bounded strategy is
    /// configured with a zero buffer size.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.backpressure.is_bounded() && self.buffer_size == 0 {
            return Err(StreamError::InvalidConfig(
                "buffer size must be strictly positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`TubeConfiguration`].
#[derive(Debug, Default)]
pub struct TubeConfigurationBuilder {
    backpressure: Option<BackpressureStrategy>,
    buffer_size: Option<usize>,
}

impl TubeConfigurationBuilder {
    /// Sets the backpressure strategy.
    #[must_use]
    pub fn backpressure(mut self, strategy: BackpressureStrategy) -> Self {
        self.backpressure = Some(strategy);
        self
    }

    /// Sets the buffer capacity.
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TubeConfiguration {
        TubeConfiguration {
            backpressure: self.backpressure.unwrap_or_default(),
            buffer_size: self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
        }
    }
}
