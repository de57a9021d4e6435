//! Progress reporting and cooperative cancellation.

use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared flag a caller sets to stop a long operation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates an un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

type Callback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Counts completed work units and checks for cancellation.
///
/// Operations call [`Progress::advance`] at batch or box granularity and
/// return [`Error::Cancelled`] as soon as the token is set.
pub struct Progress {
    total: usize,
    done: AtomicUsize,
    token: CancellationToken,
    callback: Option<Callback>,
}

impl Progress {
    /// Creates a tracker expecting `total` units of work.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
            token: CancellationToken::new(),
            callback: None,
        }
    }

    /// Tracker for callers that do not care about progress.
    pub fn silent() -> Self {
        Self::new(0)
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Calls `callback(done, total)` after every advance.
    #[must_use]
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Records `units` of completed work.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if cancellation was requested.
    pub fn advance(&self, units: usize) -> Result<()> {
        let done = self.done.fetch_add(units, Ordering::Relaxed) + units;
        if let Some(callback) = &self.callback {
            callback(done, self.total);
        }
        self.check()
    }

    /// Fails if cancellation was requested.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Units completed so far.
    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    /// Units expected in total.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Completed fraction in `[0, 1]`; 1 when no total is known.
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.done() as f64 / self.total as f64).min(1.0)
        }
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("total", &self.total)
            .field("done", &self.done())
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}
