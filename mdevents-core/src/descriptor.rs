//! Workspace descriptors: dimensions, ranges and the projection basis.

use crate::error::{Error, Result};
use crate::extents::Extent;
use crate::time_roi::TimeRoi;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Components below this magnitude are treated as zero in axis names and
/// parallel-vector checks.
const AXIS_EPSILON: f64 = 1e-3;

/// One axis of a multidimensional workspace.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dimension {
    /// Stable identifier, e.g. `Q_lab_x`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Unit label.
    pub units: String,
    /// Inclusive lower bound.
    pub min: f64,
    /// Exclusive upper bound.
    pub max: f64,
    /// Number of bins used when the dimension is histogrammed.
    pub n_bins: usize,
}

impl Dimension {
    /// Creates a dimension whose name equals its id.
    pub fn new(id: impl Into<String>, units: impl Into<String>, min: f64, max: f64, n_bins: usize) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            units: units.into(),
            min,
            max,
            n_bins,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The `[min, max)` range of the dimension.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] unless `min < max`.
    pub fn extent(&self) -> Result<Extent> {
        Extent::new(self.min, self.max)
    }

    /// Width of one histogram bin.
    #[allow(clippy::cast_precision_loss)]
    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.n_bins.max(1) as f64
    }
}

/// Metadata of one multidimensional dataset.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorkspaceDescriptor {
    /// The dimensions, in coordinate order.
    pub dimensions: Vec<Dimension>,
    /// Row-major 3x3 rotation from the lab frame into the target frame.
    pub rotation: [f64; 9],
    /// First projection vector.
    pub u: [f64; 3],
    /// Second projection vector.
    pub v: [f64; 3],
    /// True while `u` and `v` are the defaults `[1,0,0]` and `[0,1,0]`.
    pub is_uv_default: bool,
    /// Detector positions are unavailable; only modes that need no
    /// detector geometry can run.
    pub det_info_lost: bool,
    /// Time region the dataset was recorded over, when known.
    pub time_roi: Option<TimeRoi>,
}

impl Default for WorkspaceDescriptor {
    fn default() -> Self {
        Self {
            dimensions: Vec::new(),
            rotation: IDENTITY,
            u: [1.0, 0.0, 0.0],
            v: [0.0, 1.0, 0.0],
            is_uv_default: true,
            det_info_lost: false,
            time_roi: None,
        }
    }
}

const IDENTITY: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

impl WorkspaceDescriptor {
    /// Creates a descriptor over the given dimensions with an identity basis.
    pub fn new(dimensions: Vec<Dimension>) -> Self {
        Self {
            dimensions,
            ..Self::default()
        }
    }

    /// Builds `num_dims` dimensions from parallel min/max lists.
    ///
    /// Ids and names are left empty for [`Self::build_dim_names`] to fill.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when the lists disagree in length.
    pub fn from_ranges(min_values: &[f64], max_values: &[f64], n_bins: usize) -> Result<Self> {
        if min_values.len() != max_values.len() {
            return Err(Error::config(format!(
                "{} minimum values but {} maximum values",
                min_values.len(),
                max_values.len()
            )));
        }
        let dimensions = min_values
            .iter()
            .zip(max_values)
            .map(|(&min, &max)| Dimension::new("", "", min, max, n_bins))
            .collect();
        Ok(Self::new(dimensions))
    }

    /// Number of dimensions.
    pub fn num_dims(&self) -> usize {
        self.dimensions.len()
    }

    /// The full-space extents used for the root box.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] for a dimension with `min >= max`.
    pub fn extents(&self) -> Result<Vec<Extent>> {
        self.dimensions.iter().map(Dimension::extent).collect()
    }

    /// Fills empty ids with `Dim{i}` and empty names with the id.
    pub fn build_dim_names(&mut self) {
        for (i, dim) in self.dimensions.iter_mut().enumerate() {
            if dim.id.is_empty() {
                dim.id = format!("Dim{i}");
            }
            if dim.name.is_empty() {
                dim.name.clone_from(&dim.id);
            }
        }
    }

    /// Checks that the descriptor has `expected_dims` dimensions, each with
    /// a non-empty finite range.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] describing the first inconsistency.
    pub fn check_min_max_consistent(&self, expected_dims: usize) -> Result<()> {
        if self.num_dims() != expected_dims {
            return Err(Error::config(format!(
                "the conversion produces {expected_dims} dimensions but {} min/max pairs were given",
                self.num_dims()
            )));
        }
        for (i, dim) in self.dimensions.iter().enumerate() {
            if !(dim.min.is_finite() && dim.max.is_finite()) || dim.min >= dim.max {
                return Err(Error::config(format!(
                    "dimension {i} ({}) has min {} not below max {}",
                    dim.id, dim.min, dim.max
                )));
            }
        }
        Ok(())
    }

    /// Sets the projection vectors and derives the rotation.
    ///
    /// The target frame is `e1 = u/|u|`, `e3 = (u x v)/|u x v|`,
    /// `e2 = e3 x e1`; the rotation rows are `e1, e2, e3`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `u` is null or parallel to `v`.
    pub fn set_projection(&mut self, u: [f64; 3], v: [f64; 3]) -> Result<()> {
        let e1 = normalize(u).ok_or_else(|| Error::config("projection vector u is null"))?;
        let e3 = normalize(cross(u, v))
            .ok_or_else(|| Error::config("projection vectors u and v are parallel"))?;
        let e2 = cross(e3, e1);
        self.rotation = [
            e1[0], e1[1], e1[2], e2[0], e2[1], e2[2], e3[0], e3[1], e3[2],
        ];
        self.u = u;
        self.v = v;
        self.is_uv_default = u == [1.0, 0.0, 0.0] && v == [0.0, 1.0, 0.0];
        Ok(())
    }

    /// Applies the rotation to a lab-frame vector.
    pub fn rotate(&self, q: [f64; 3]) -> [f64; 3] {
        apply_rotation(&self.rotation, q)
    }

    /// Names the three momentum dimensions after the rows of the rotation,
    /// e.g. `[Q_h,0,0]`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when fewer than three dimensions exist.
    pub fn name_q3d_dimensions(&mut self, base_names: [&str; 3]) -> Result<()> {
        if self.num_dims() < 3 {
            return Err(Error::config("Q3D naming needs at least three dimensions"));
        }
        let r = self.rotation;
        for (i, dim) in self.dimensions.iter_mut().take(3).enumerate() {
            let direction = [r[3 * i], r[3 * i + 1], r[3 * i + 2]];
            dim.name = make_axis_name(direction, base_names);
        }
        Ok(())
    }
}

/// Builds an axis label such as `[Q_h,-Q_k,0]` or `[0.71Q_h,0.71Q_k,0]`.
pub fn make_axis_name(direction: [f64; 3], names: [&str; 3]) -> String {
    let parts: Vec<String> = direction
        .iter()
        .zip(names)
        .map(|(&component, name)| {
            if component.abs() < AXIS_EPSILON {
                "0".to_string()
            } else if (component - 1.0).abs() < AXIS_EPSILON {
                name.to_string()
            } else if (component + 1.0).abs() < AXIS_EPSILON {
                format!("-{name}")
            } else {
                format!("{component:.2}{name}")
            }
        })
        .collect();
    format!("[{}]", parts.join(","))
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(a: [f64; 3]) -> Option<[f64; 3]> {
    let norm = (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt();
    (norm > AXIS_EPSILON).then(|| [a[0] / norm, a[1] / norm, a[2] / norm])
}

/// Multiplies `q` by a row-major 3x3 rotation.
pub fn apply_rotation(rotation: &[f64; 9], q: [f64; 3]) -> [f64; 3] {
    let r = rotation;
    [
        r[0] * q[0] + r[1] * q[1] + r[2] * q[2],
        r[3] * q[0] + r[4] * q[1] + r[5] * q[2],
        r[6] * q[0] + r[7] * q[1] + r[8] * q[2],
    ]
}
