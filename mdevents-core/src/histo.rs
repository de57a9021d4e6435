//! Dense histogram grids.

use crate::error::{Error, Result};
use ndarray::{ArrayD, IxDyn};

/// A dense N-dimensional grid of signal and squared error.
///
/// Cells are addressed either by an N-dimensional index or by a flat
/// row-major linear index (last dimension varies fastest).
#[derive(Debug, Clone, PartialEq)]
pub struct MdHistoGrid {
    signal: ArrayD<f64>,
    error_sq: ArrayD<f64>,
    num_events: ArrayD<f64>,
}

impl MdHistoGrid {
    /// Creates a zeroed grid of the given shape.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an empty shape or a zero-length axis.
    pub fn new(shape: &[usize]) -> Result<Self> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(Error::config(format!("invalid histogram shape {shape:?}")));
        }
        let zeros = ArrayD::<f64>::zeros(IxDyn(shape));
        Ok(Self {
            signal: zeros.clone(),
            error_sq: zeros.clone(),
            num_events: zeros,
        })
    }

    /// Number of bins along each dimension.
    pub fn shape(&self) -> &[usize] {
        self.signal.shape()
    }

    /// Number of dimensions.
    pub fn num_dims(&self) -> usize {
        self.signal.ndim()
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.signal.len()
    }

    /// Always false; a grid has at least one cell.
    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }

    fn flat(array: &ArrayD<f64>, index: usize) -> Option<f64> {
        array.as_slice().and_then(|cells| cells.get(index)).copied()
    }

    /// Signal of cell `index`, or `None` past the end.
    pub fn signal_at(&self, index: usize) -> Option<f64> {
        Self::flat(&self.signal, index)
    }

    /// Error (square root of the squared error) of cell `index`.
    pub fn error_at(&self, index: usize) -> Option<f64> {
        Self::flat(&self.error_sq, index).map(f64::sqrt)
    }

    /// Squared error of cell `index`.
    pub fn error_squared_at(&self, index: usize) -> Option<f64> {
        Self::flat(&self.error_sq, index)
    }

    /// Number of events binned into cell `index`.
    pub fn num_events_at(&self, index: usize) -> Option<f64> {
        Self::flat(&self.num_events, index)
    }

    /// Adds one event's contribution to the cell at `index`.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] for the wrong index length and
    /// [`Error::Configuration`] for an index outside the grid.
    pub fn add_at(&mut self, index: &[usize], signal: f64, error_sq: f64) -> Result<()> {
        if index.len() != self.num_dims() {
            return Err(Error::DimensionMismatch {
                expected: self.num_dims(),
                actual: index.len(),
            });
        }
        let shape = self.shape().to_vec();
        let cell = self
            .signal
            .get_mut(index)
            .ok_or_else(|| Error::config(format!("bin {index:?} outside grid {shape:?}")))?;
        *cell += signal;
        if let Some(cell) = self.error_sq.get_mut(index) {
            *cell += error_sq;
        }
        if let Some(cell) = self.num_events.get_mut(index) {
            *cell += 1.0;
        }
        Ok(())
    }

    /// Overwrites the signal and squared error of cell `index`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when `index` is past the end.
    pub fn set_at(&mut self, index: usize, signal: f64, error_sq: f64) -> Result<()> {
        let len = self.len();
        let out_of_range = || Error::config(format!("linear index {index} outside grid of {len} cells"));
        let s = self
            .signal
            .as_slice_mut()
            .and_then(|cells| cells.get_mut(index))
            .ok_or_else(out_of_range)?;
        *s = signal;
        let e = self
            .error_sq
            .as_slice_mut()
            .and_then(|cells| cells.get_mut(index))
            .ok_or_else(out_of_range)?;
        *e = error_sq;
        Ok(())
    }

    /// Sum of all cell signals.
    pub fn total_signal(&self) -> f64 {
        self.signal.sum()
    }

    /// The signal array.
    pub fn signal(&self) -> &ArrayD<f64> {
        &self.signal
    }
}
