//! Error type for event files and spill storage.

use thiserror::Error;

/// Result alias used throughout mdevents-io.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reading or writing event files and sizing the memory budget.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying file error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Event file with a bad header, payload or CSV row.
    #[error("invalid event file: {0}")]
    InvalidFormat(String),

    /// Memory budget that cannot be resolved.
    #[error("invalid memory budget: {0}")]
    InvalidBudget(String),

    /// Error raised by the box tree or an event store.
    #[error(transparent)]
    Core(#[from] mdevents_core::Error),
}
