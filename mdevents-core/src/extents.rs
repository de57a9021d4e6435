//! Half-open box extents along one dimension.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The `[min, max)` interval a box covers along one dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Extent {
    /// Inclusive lower bound.
    pub min: f64,
    /// Exclusive upper bound.
    pub max: f64,
}

impl Extent {
    /// Creates an extent, rejecting empty or inverted intervals.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] unless `min < max` and both are finite.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if min >= max || !min.is_finite() || !max.is_finite() {
            return Err(Error::InvalidRange {
                start: min.to_string(),
                stop: max.to_string(),
            });
        }
        Ok(Self { min, max })
    }

    /// Width of the interval.
    #[inline]
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Half-open containment test.
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value < self.max
    }

    /// Lower boundary of sub-interval `index` when split into `parts`.
    ///
    /// `boundary(parts, parts)` is exactly `max`, so adjacent children share
    /// bit-identical boundaries and the last child ends on the parent's edge.
    #[allow(clippy::cast_precision_loss)]
    pub fn boundary(&self, index: usize, parts: usize) -> f64 {
        if index == 0 {
            self.min
        } else if index >= parts {
            self.max
        } else {
            self.min + self.width() * (index as f64) / (parts as f64)
        }
    }

    /// Sub-interval `index` of `parts` equal pieces.
    pub fn sub_extent(&self, index: usize, parts: usize) -> Self {
        Self {
            min: self.boundary(index, parts),
            max: self.boundary(index + 1, parts),
        }
    }

    /// Index of the sub-interval containing `value`, or `None` when outside.
    ///
    /// The estimate from the division is corrected against
    /// [`Self::boundary`] so the answer always agrees with
    /// [`Self::sub_extent`] containment.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn sub_index(&self, value: f64, parts: usize) -> Option<usize> {
        if !self.contains(value) || parts == 0 {
            return None;
        }
        let estimate = ((value - self.min) / self.width() * parts as f64).floor();
        let mut index = (estimate.max(0.0) as usize).min(parts - 1);
        while index > 0 && value < self.boundary(index, parts) {
            index -= 1;
        }
        while index + 1 < parts && value >= self.boundary(index + 1, parts) {
            index += 1;
        }
        Some(index)
    }
}

/// Product of the extent widths.
pub fn volume(extents: &[Extent]) -> f64 {
    extents.iter().map(Extent::width).product()
}

/// Checks that `coords` lies inside every extent.
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] for the wrong coordinate count and
/// [`Error::OutOfBounds`] for the first dimension that escapes.
pub fn check_contains(extents: &[Extent], coords: &[f32]) -> Result<()> {
    if coords.len() != extents.len() {
        return Err(Error::DimensionMismatch {
            expected: extents.len(),
            actual: coords.len(),
        });
    }
    for (dimension, (extent, &c)) in extents.iter().zip(coords).enumerate() {
        let value = f64::from(c);
        if !extent.contains(value) {
            return Err(Error::OutOfBounds {
                dimension,
                value,
                min: extent.min,
                max: extent.max,
            });
        }
    }
    Ok(())
}
