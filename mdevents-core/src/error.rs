//! Error types for mdevents-core.

use thiserror::Error;

/// Result type alias for mdevents operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for box-tree and time-ROI operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An interval-defining call received `start >= stop`.
    #[error("{start} and {stop} are not in increasing order")]
    InvalidRange { start: String, stop: String },

    /// An event coordinate escaped the root extents.
    #[error("coordinate {value} in dimension {dimension} is outside [{min}, {max})")]
    OutOfBounds {
        dimension: usize,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Invalid box-controller or descriptor configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An event or extent list has the wrong number of dimensions.
    #[error("expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A box tree failed its structural checks. Indicates a bug.
    #[error("structural invariant violated: {0}")]
    StructuralInvariant(String),

    /// Events could not be written to or faulted in from secondary storage.
    #[error("event store error: {0}")]
    Store(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation observed a cancellation request.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for a [`Error::Configuration`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for a [`Error::Store`] error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }
}
