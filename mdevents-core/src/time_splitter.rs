//! Assignment of time ranges to output workspace indices.

use crate::error::Result;
use crate::time_roi::{assert_increasing, DateAndTime, TimeRoi};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Step function from time to a destination workspace index.
///
/// Uses the same half-open boundary convention as [`TimeRoi`]. Times before
/// the first boundary map to [`TimeSplitter::NO_TARGET`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeSplitter {
    roi_map: BTreeMap<DateAndTime, i32>,
}

impl TimeSplitter {
    /// Destination for filtered-out events.
    pub const NO_TARGET: i32 = -1;

    /// Creates a splitter that sends everything to [`Self::NO_TARGET`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a splitter sending `[start, stop)` to workspace 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidRange`] unless `start < stop`.
    pub fn from_range(start: DateAndTime, stop: DateAndTime) -> Result<Self> {
        let mut splitter = Self::new();
        splitter.add_roi(start, stop, 0)?;
        Ok(splitter)
    }

    /// Sends `[start, stop)` to `value`, replacing whatever was there.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidRange`] unless `start < stop`.
    pub fn add_roi(&mut self, start: DateAndTime, stop: DateAndTime, value: i32) -> Result<()> {
        assert_increasing(start, stop)?;
        let after = self.value_at_time(stop);
        let inside: Vec<DateAndTime> = self.roi_map.range(start..=stop).map(|(t, _)| *t).collect();
        for time in inside {
            self.roi_map.remove(&time);
        }
        self.roi_map.insert(start, value);
        self.roi_map.insert(stop, after);
        self.collapse();
        Ok(())
    }

    fn collapse(&mut self) {
        let mut previous = Self::NO_TARGET;
        self.roi_map.retain(|_, value| {
            let keep = *value != previous;
            previous = *value;
            keep
        });
    }

    /// Destination index at `time`.
    pub fn value_at_time(&self, time: DateAndTime) -> i32 {
        self.roi_map
            .range(..=time)
            .next_back()
            .map_or(Self::NO_TARGET, |(_, value)| *value)
    }

    /// Sorted distinct destination indices, excluding [`Self::NO_TARGET`].
    pub fn output_workspace_indices(&self) -> Vec<i32> {
        self.roi_map
            .values()
            .copied()
            .filter(|&v| v != Self::NO_TARGET)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// The times routed to `workspace_index`, as a [`TimeRoi`].
    pub fn time_roi(&self, workspace_index: i32) -> TimeRoi {
        let mut roi = TimeRoi::from_boundaries(
            self.roi_map
                .iter()
                .map(|(time, value)| (*time, *value == workspace_index)),
        );
        if roi.boundaries().any(|(_, selected)| selected) {
            roi.remove_redundant_entries();
        } else {
            roi.clear();
        }
        roi
    }

    /// Number of stored boundaries.
    pub fn num_raw_values(&self) -> usize {
        self.roi_map.len()
    }
}

impl fmt::Display for TimeSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (time, value) in &self.roi_map {
            writeln!(f, "{value}|{time}")?;
        }
        Ok(())
    }
}
