//! Box-controller configuration.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of equal sub-intervals each dimension is divided into at a split.
///
/// Either one value shared by every dimension (`"5"`) or one value per
/// dimension (`"5,5,2"`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum SplitInto {
    /// The same fan-out in every dimension.
    Uniform(usize),
    /// One fan-out per dimension.
    PerDimension(Vec<usize>),
}

impl SplitInto {
    /// Parses a comma separated list of positive integers.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for empty, non-numeric or zero entries.
    pub fn parse(text: &str) -> Result<Self> {
        let values = text
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|e| Error::config(format!("invalid SplitInto entry '{part}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        if values.contains(&0) {
            return Err(Error::config("SplitInto entries must be at least 1"));
        }
        match values.as_slice() {
            [] => Err(Error::config("SplitInto is empty")),
            [single] => Ok(Self::Uniform(*single)),
            _ => Ok(Self::PerDimension(values)),
        }
    }

    /// Resolves the fan-out of every dimension of an `num_dims` workspace.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if a per-dimension list has the
    /// wrong length or any fan-out is zero.
    pub fn resolve(&self, num_dims: usize) -> Result<Vec<usize>> {
        let resolved = match self {
            Self::Uniform(n) => vec![*n; num_dims],
            Self::PerDimension(values) => {
                if values.len() != num_dims {
                    return Err(Error::config(format!(
                        "SplitInto lists {} values for a {num_dims}-dimensional workspace",
                        values.len()
                    )));
                }
                values.clone()
            }
        };
        if resolved.contains(&0) {
            return Err(Error::config("SplitInto entries must be at least 1"));
        }
        Ok(resolved)
    }
}

impl Default for SplitInto {
    fn default() -> Self {
        Self::Uniform(5)
    }
}

impl fmt::Display for SplitInto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform(n) => write!(f, "{n}"),
            Self::PerDimension(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

impl FromStr for SplitInto {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SplitInto {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SplitInto> for String {
    fn from(value: SplitInto) -> Self {
        value.to_string()
    }
}

/// What insertion does with an event outside the root extents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OutOfBoundsPolicy {
    /// Fail the insertion with [`Error::OutOfBounds`].
    #[default]
    Reject,
    /// Skip the event and count it as dropped.
    Drop,
}

/// Configuration for box splitting.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BoxControllerConfig {
    /// Fan-out per dimension at each split.
    pub split_into: SplitInto,
    /// A leaf holding more events than this splits.
    pub split_threshold: usize,
    /// Boxes at this depth never split.
    pub max_depth: usize,
    /// Every box is split down to this depth right after creation.
    pub min_depth: Option<usize>,
    /// Handling of events outside the root extents.
    pub out_of_bounds: OutOfBoundsPolicy,
    /// Split sibling boxes on the rayon pool. Box ids become run-local.
    pub parallel: bool,
}

impl Default for BoxControllerConfig {
    fn default() -> Self {
        Self {
            split_into: SplitInto::Uniform(5),
            split_threshold: 1000,
            max_depth: 20,
            min_depth: None,
            out_of_bounds: OutOfBoundsPolicy::Reject,
            parallel: false,
        }
    }
}

impl BoxControllerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fan-out.
    #[must_use]
    pub fn with_split_into(mut self, split_into: SplitInto) -> Self {
        self.split_into = split_into;
        self
    }

    /// Sets the split threshold.
    #[must_use]
    pub fn with_split_threshold(mut self, threshold: usize) -> Self {
        self.split_threshold = threshold;
        self
    }

    /// Sets the maximum recursion depth.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the forced minimum recursion depth.
    #[must_use]
    pub fn with_min_depth(mut self, depth: usize) -> Self {
        self.min_depth = Some(depth);
        self
    }

    /// Sets the out-of-bounds policy.
    #[must_use]
    pub fn with_out_of_bounds(mut self, policy: OutOfBoundsPolicy) -> Self {
        self.out_of_bounds = policy;
        self
    }

    /// Enables or disables parallel splitting.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validates the configuration for an `num_dims` workspace and returns
    /// the resolved per-dimension fan-out.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for a zero threshold, a bad fan-out,
    /// or `min_depth > max_depth`.
    pub fn validate(&self, num_dims: usize) -> Result<Vec<usize>> {
        if num_dims == 0 {
            return Err(Error::config("a workspace needs at least one dimension"));
        }
        if self.split_threshold == 0 {
            return Err(Error::config("SplitThreshold must be at least 1"));
        }
        if let Some(min_depth) = self.min_depth {
            if min_depth > self.max_depth {
                return Err(Error::config(format!(
                    "MinRecursionDepth ({min_depth}) must be <= MaxRecursionDepth ({})",
                    self.max_depth
                )));
            }
        }
        self.split_into.resolve(num_dims)
    }

    /// Loads a configuration from a JSON string. Missing fields take defaults.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the JSON does not parse.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(e.to_string()))
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an I/O error or [`Error::Configuration`].
    #[cfg(feature = "serde")]
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
