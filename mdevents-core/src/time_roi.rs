//! Time regions of interest as a stepwise boolean function.
//!
//! A [`TimeRoi`] stores sorted boundary points. Each boundary holds its value
//! from its own timestamp (inclusive) up to the next boundary (exclusive);
//! before the first boundary, and everywhere on an empty ROI, the value is
//! "ignore". An ROI whose last boundary is "use" extends to infinity.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Value of a boundary that opens a region of interest.
pub const ROI_USE: bool = true;
/// Value of a boundary that closes a region of interest.
pub const ROI_IGNORE: bool = false;

const NANOS_PER_SECOND: f64 = 1e9;

/// Absolute time with nanosecond resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DateAndTime(i64);

impl DateAndTime {
    /// Creates a time from nanoseconds since the epoch.
    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Creates a time from (fractional) seconds since the epoch, rounded to
    /// the nearest nanosecond.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_seconds(seconds: f64) -> Self {
        Self((seconds * NANOS_PER_SECOND).round() as i64)
    }

    /// Nanoseconds since the epoch.
    #[inline]
    pub const fn nanos(&self) -> i64 {
        self.0
    }

    /// Seconds since the epoch.
    #[allow(clippy::cast_precision_loss)]
    pub fn seconds(&self) -> f64 {
        self.0 as f64 / NANOS_PER_SECOND
    }

    /// Signed number of seconds from `earlier` to `self`.
    #[allow(clippy::cast_precision_loss)]
    pub fn seconds_since(&self, earlier: DateAndTime) -> f64 {
        (self.0 - earlier.0) as f64 / NANOS_PER_SECOND
    }
}

impl fmt::Display for DateAndTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:09}s", abs / 1_000_000_000, abs % 1_000_000_000)
    }
}

/// Fails unless `start < stop`.
pub(crate) fn assert_increasing(start: DateAndTime, stop: DateAndTime) -> Result<()> {
    if start < stop {
        Ok(())
    } else {
        Err(Error::InvalidRange {
            start: start.to_string(),
            stop: stop.to_string(),
        })
    }
}

/// Alternating "use"/"ignore" runs over an unbounded timeline.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeRoi {
    boundaries: BTreeMap<DateAndTime, bool>,
}

impl TimeRoi {
    /// Creates an empty ROI, which ignores every time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an ROI using exactly `[start, stop)`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] unless `start < stop`.
    pub fn from_range(start: DateAndTime, stop: DateAndTime) -> Result<Self> {
        let mut roi = Self::new();
        roi.add_roi(start, stop)?;
        Ok(roi)
    }

    pub(crate) fn from_boundaries(boundaries: impl IntoIterator<Item = (DateAndTime, bool)>) -> Self {
        Self {
            boundaries: boundaries.into_iter().collect(),
        }
    }

    /// Marks `[start, stop)` as "use".
    ///
    /// Boundaries inside the range are overwritten. The boundary at `stop`
    /// takes whatever value held at `stop` before the call. Redundant
    /// boundaries are left in place until [`Self::remove_redundant_entries`].
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] unless `start < stop`.
    pub fn add_roi(&mut self, start: DateAndTime, stop: DateAndTime) -> Result<()> {
        assert_increasing(start, stop)?;
        self.replace_range(start, stop, ROI_USE);
        Ok(())
    }

    /// Marks `[start, stop)` as "ignore".
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] unless `start < stop`.
    pub fn add_mask(&mut self, start: DateAndTime, stop: DateAndTime) -> Result<()> {
        assert_increasing(start, stop)?;
        self.replace_range(start, stop, ROI_IGNORE);
        Ok(())
    }

    fn replace_range(&mut self, start: DateAndTime, stop: DateAndTime, value: bool) {
        let after = self.value_at_time(stop);
        let inside: Vec<DateAndTime> = self.boundaries.range(start..=stop).map(|(t, _)| *t).collect();
        for time in inside {
            self.boundaries.remove(&time);
        }
        self.boundaries.insert(start, value);
        self.boundaries.insert(stop, after);
    }

    /// Whether `time` falls in a "use" region.
    pub fn value_at_time(&self, time: DateAndTime) -> bool {
        self.boundaries
            .range(..=time)
            .next_back()
            .map_or(ROI_IGNORE, |(_, value)| *value)
    }

    /// Number of stored boundary points.
    pub fn num_boundaries(&self) -> usize {
        self.boundaries.len()
    }

    /// True when no boundary is stored, i.e. the ROI never selects anything.
    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Removes every boundary.
    pub fn clear(&mut self) {
        self.boundaries.clear();
    }

    /// Iterates over the stored boundaries in time order.
    pub fn boundaries(&self) -> impl Iterator<Item = (DateAndTime, bool)> + '_ {
        self.boundaries.iter().map(|(t, v)| (*t, *v))
    }

    /// Normalizes the boundary list.
    ///
    /// Leading "ignore" boundaries are dropped, then each run of equal
    /// values is collapsed to its first boundary. An ROI that never reaches
    /// "use" becomes empty. ROIs with fewer than two boundaries are left
    /// untouched.
    pub fn remove_redundant_entries(&mut self) {
        if self.num_boundaries() < 2 {
            return;
        }

        let mut kept = BTreeMap::new();
        let mut previous = ROI_IGNORE;
        for (&time, &value) in &self.boundaries {
            if value != previous {
                kept.insert(time, value);
                previous = value;
            }
        }

        if kept.len() != self.boundaries.len() {
            self.boundaries = kept;
        }
    }

    /// Replaces `self` with the point-wise AND of `self` and `other`.
    pub fn update_intersection(&mut self, other: &TimeRoi) {
        self.combine(other, |a, b| a && b);
    }

    /// Replaces `self` with the point-wise OR of `self` and `other`.
    pub fn update_union(&mut self, other: &TimeRoi) {
        self.combine(other, |a, b| a || b);
    }

    fn combine(&mut self, other: &TimeRoi, op: impl Fn(bool, bool) -> bool) {
        self.remove_redundant_entries();
        if *self == *other {
            return;
        }

        let times: BTreeSet<DateAndTime> = self
            .boundaries
            .keys()
            .chain(other.boundaries.keys())
            .copied()
            .collect();

        let combined: BTreeMap<DateAndTime, bool> = times
            .into_iter()
            .map(|time| (time, op(self.value_at_time(time), other.value_at_time(time))))
            .collect();

        if combined.values().all(|&value| value == ROI_IGNORE) {
            self.boundaries.clear();
        } else {
            self.boundaries = combined;
        }

        self.remove_redundant_entries();
    }

    /// Total time covered by "use" regions, in seconds.
    ///
    /// Returns `0.0` for an empty ROI and `f64::INFINITY` when the last
    /// boundary opens a region that never closes.
    pub fn duration_in_seconds(&self) -> f64 {
        match self.boundaries.iter().next_back() {
            None => 0.0,
            Some((_, &ROI_USE)) => f64::INFINITY,
            Some(_) => self
                .boundaries
                .iter()
                .zip(self.boundaries.iter().skip(1))
                .filter(|(first, _)| *first.1 == ROI_USE)
                .map(|((start, _), (stop, _))| stop.seconds_since(*start))
                .sum(),
        }
    }

    /// The "use" intervals in time order. The last interval has no stop
    /// time when the ROI is open-ended.
    pub fn to_rois(&self) -> Vec<(DateAndTime, Option<DateAndTime>)> {
        let mut normalized = self.clone();
        normalized.remove_redundant_entries();

        let mut rois = Vec::new();
        let mut open: Option<DateAndTime> = None;
        for (time, value) in normalized.boundaries() {
            match (value, open) {
                (ROI_USE, None) => open = Some(time),
                (ROI_IGNORE, Some(start)) => {
                    rois.push((start, Some(time)));
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(start) = open {
            rois.push((start, None));
        }
        rois
    }
}

impl PartialEq for TimeRoi {
    /// Two ROIs are equal when their normalized boundary lists match.
    fn eq(&self, other: &Self) -> bool {
        let mut lhs = self.clone();
        let mut rhs = other.clone();
        lhs.remove_redundant_entries();
        rhs.remove_redundant_entries();
        lhs.boundaries == rhs.boundaries
    }
}

impl fmt::Display for TimeRoi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (time, value)) in self.boundaries().enumerate() {
            writeln!(f, "{i}: {time}, {}", u8::from(value))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn t(seconds: f64) -> DateAndTime {
        DateAndTime::from_seconds(seconds)
    }

    #[test]
    fn test_empty_ignores_everything() {
        let roi = TimeRoi::new();
        assert!(roi.is_empty());
        assert!(!roi.value_at_time(t(0.0)));
        assert_relative_eq!(roi.duration_in_seconds(), 0.0);
    }

    #[test]
    fn test_add_roi_half_open() {
        let mut roi = TimeRoi::new();
        roi.add_roi(t(10.0), t(20.0)).unwrap();
        assert!(!roi.value_at_time(t(9.999)));
        assert!(roi.value_at_time(t(10.0)));
        assert!(roi.value_at_time(t(19.999)));
        assert!(!roi.value_at_time(t(20.0)));
        assert_relative_eq!(roi.duration_in_seconds(), 10.0);
    }

    #[test]
    fn test_invalid_range() {
        let mut roi = TimeRoi::new();
        assert!(matches!(
            roi.add_roi(t(2.0), t(1.0)),
            Err(Error::InvalidRange { .. })
        ));
        assert!(roi.add_mask(t(1.0), t(1.0)).is_err());
        assert!(roi.is_empty());
    }

    #[test]
    fn test_overlapping_rois_union() {
        let mut roi = TimeRoi::new();
        roi.add_roi(t(10.0), t(20.0)).unwrap();
        roi.add_roi(t(15.0), t(30.0)).unwrap();
        assert_relative_eq!(roi.duration_in_seconds(), 20.0);

        roi.add_roi(t(12.0), t(14.0)).unwrap();
        assert!(roi.value_at_time(t(14.0)));
        assert_relative_eq!(roi.duration_in_seconds(), 20.0);
    }

    #[test]
    fn test_mask_inside_roi() {
        let mut roi = TimeRoi::from_range(t(0.0), t(100.0)).unwrap();
        roi.add_mask(t(40.0), t(50.0)).unwrap();
        assert!(roi.value_at_time(t(39.0)));
        assert!(!roi.value_at_time(t(45.0)));
        assert!(roi.value_at_time(t(50.0)));
        assert_relative_eq!(roi.duration_in_seconds(), 90.0);
        assert_eq!(roi.to_rois(), vec![(t(0.0), Some(t(40.0))), (t(50.0), Some(t(100.0)))]);
    }

    #[test]
    fn test_mask_on_empty_is_noop() {
        let mut roi = TimeRoi::new();
        roi.add_mask(t(1.0), t(2.0)).unwrap();
        roi.remove_redundant_entries();
        assert!(roi.is_empty());
    }

    #[test]
    fn test_open_ended_duration() {
        let roi = TimeRoi::from_boundaries([(t(5.0), ROI_USE)]);
        assert!(roi.duration_in_seconds().is_infinite());
        assert_eq!(roi.to_rois(), vec![(t(5.0), None)]);
    }

    #[test]
    fn test_remove_redundant_entries() {
        let mut roi = TimeRoi::from_boundaries([
            (t(1.0), ROI_IGNORE),
            (t(2.0), ROI_USE),
            (t(3.0), ROI_USE),
            (t(4.0), ROI_IGNORE),
            (t(5.0), ROI_IGNORE),
            (t(6.0), ROI_USE),
            (t(7.0), ROI_IGNORE),
        ]);
        roi.remove_redundant_entries();
        let boundaries: Vec<_> = roi.boundaries().collect();
        assert_eq!(
            boundaries,
            vec![
                (t(2.0), ROI_USE),
                (t(4.0), ROI_IGNORE),
                (t(6.0), ROI_USE),
                (t(7.0), ROI_IGNORE),
            ]
        );
    }

    #[test]
    fn test_single_boundary_untouched() {
        let mut roi = TimeRoi::from_boundaries([(t(1.0), ROI_IGNORE)]);
        roi.remove_redundant_entries();
        assert_eq!(roi.num_boundaries(), 1);
    }

    #[test]
    fn test_intersection() {
        let mut a = TimeRoi::from_range(t(0.0), t(10.0)).unwrap();
        let b = TimeRoi::from_range(t(5.0), t(15.0)).unwrap();
        a.update_intersection(&b);
        assert_eq!(a, TimeRoi::from_range(t(5.0), t(10.0)).unwrap());
        assert_relative_eq!(a.duration_in_seconds(), 5.0);
    }

    #[test]
    fn test_disjoint_intersection_is_empty() {
        let mut a = TimeRoi::from_range(t(0.0), t(1.0)).unwrap();
        let b = TimeRoi::from_range(t(2.0), t(3.0)).unwrap();
        a.update_intersection(&b);
        assert!(a.is_empty());
    }

    #[test]
    fn test_intersection_idempotent() {
        let mut a = TimeRoi::from_range(t(0.0), t(10.0)).unwrap();
        a.add_roi(t(20.0), t(30.0)).unwrap();
        let original = a.clone();
        a.update_intersection(&original);
        assert_eq!(a, original);
    }

    #[test]
    fn test_union() {
        let mut a = TimeRoi::from_range(t(0.0), t(10.0)).unwrap();
        let b = TimeRoi::from_range(t(5.0), t(15.0)).unwrap();
        a.update_union(&b);
        assert_eq!(a, TimeRoi::from_range(t(0.0), t(15.0)).unwrap());

        let mut disjoint = TimeRoi::from_range(t(0.0), t(1.0)).unwrap();
        disjoint.update_union(&TimeRoi::from_range(t(2.0), t(3.0)).unwrap());
        assert_relative_eq!(disjoint.duration_in_seconds(), 2.0);
        assert_eq!(disjoint.to_rois().len(), 2);
    }

    #[test]
    fn test_union_with_empty() {
        let mut empty = TimeRoi::new();
        let b = TimeRoi::from_range(t(1.0), t(2.0)).unwrap();
        empty.update_union(&b);
        assert_eq!(empty, b);

        let mut a = b.clone();
        a.update_union(&TimeRoi::new());
        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_uses_normalized_form() {
        let a = TimeRoi::from_range(t(1.0), t(2.0)).unwrap();
        let b = TimeRoi::from_boundaries([
            (t(0.0), ROI_IGNORE),
            (t(1.0), ROI_USE),
            (t(1.5), ROI_USE),
            (t(2.0), ROI_IGNORE),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_display() {
        let roi = TimeRoi::from_range(DateAndTime::from_nanos(1_500_000_000), t(2.0)).unwrap();
        assert_eq!(roi.to_string(), "0: 1.500000000s, 1\n1: 2.000000000s, 0\n");
    }
}
