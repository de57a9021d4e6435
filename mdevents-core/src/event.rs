//! Event records: N coordinates, a signal and a squared error.

use std::cmp::Ordering;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single recorded measurement in an N-dimensional workspace.
///
/// Events are immutable once built. The total order compares coordinates
/// (dimension 0 first), then signal, then squared error, using IEEE total
/// ordering so NaN and signed zero sort deterministically. The order exists
/// for deterministic set comparison only and carries no physical meaning.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MdEvent {
    coords: Vec<f32>,
    signal: f32,
    error_sq: f32,
}

impl MdEvent {
    /// Creates a new event.
    pub fn new(coords: impl Into<Vec<f32>>, signal: f32, error_sq: f32) -> Self {
        Self {
            coords: coords.into(),
            signal,
            error_sq,
        }
    }

    /// Creates an event with unit signal and unit squared error.
    pub fn unweighted(coords: impl Into<Vec<f32>>) -> Self {
        Self::new(coords, 1.0, 1.0)
    }

    /// Number of dimensions of this event.
    #[inline]
    pub fn num_dims(&self) -> usize {
        self.coords.len()
    }

    /// Coordinates of the event.
    #[inline]
    pub fn coords(&self) -> &[f32] {
        &self.coords
    }

    /// Coordinate along dimension `d`.
    #[inline]
    pub fn center(&self, d: usize) -> f32 {
        self.coords[d]
    }

    /// Signal carried by the event.
    #[inline]
    pub fn signal(&self) -> f32 {
        self.signal
    }

    /// Squared error carried by the event.
    #[inline]
    pub fn error_squared(&self) -> f32 {
        self.error_sq
    }

    /// Borrowed view of this event.
    #[inline]
    pub fn view(&self) -> EventRef<'_> {
        EventRef {
            coords: &self.coords,
            signal: self.signal,
            error_sq: self.error_sq,
        }
    }
}

impl PartialEq for MdEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MdEvent {}

impl PartialOrd for MdEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MdEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.view().total_cmp(&other.view())
    }
}

impl fmt::Display for MdEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.view(), f)
    }
}

/// Borrowed event, as handed out by [`crate::EventBatch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventRef<'a> {
    /// Coordinates of the event.
    pub coords: &'a [f32],
    /// Signal carried by the event.
    pub signal: f32,
    /// Squared error carried by the event.
    pub error_sq: f32,
}

impl EventRef<'_> {
    /// Copies the view into an owned event.
    pub fn to_event(&self) -> MdEvent {
        MdEvent::new(self.coords.to_vec(), self.signal, self.error_sq)
    }

    /// Lexicographic total order: coordinates, then signal, then error.
    ///
    /// Events with fewer coordinates sort first when all shared
    /// coordinates tie.
    pub fn total_cmp(&self, other: &EventRef<'_>) -> Ordering {
        for (a, b) in self.coords.iter().zip(other.coords) {
            match a.total_cmp(b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        self.coords
            .len()
            .cmp(&other.coords.len())
            .then_with(|| self.signal.total_cmp(&other.signal))
            .then_with(|| self.error_sq.total_cmp(&other.error_sq))
    }
}

impl fmt::Display for EventRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.coords {
            write!(f, "{c}, ")?;
        }
        write!(f, "signal = {}, error = {}", self.signal, self.error_sq)
    }
}
