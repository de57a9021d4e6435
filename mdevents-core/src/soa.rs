//! Structure of Arrays (`SoA`) event storage.
//!
//! Leaf boxes buffer their events in an [`EventBatch`]: one flat coordinate
//! vector with a stride of `num_dims`, plus parallel signal and error
//! vectors. The same layout is used for the little-endian byte encoding
//! that event stores write to secondary storage.

use crate::error::{Error, Result};
use crate::event::{EventRef, MdEvent};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A batch of events stored in Structure of Arrays (`SoA`) format.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventBatch {
    num_dims: usize,
    /// Coordinates, `num_dims` values per event.
    coords: Vec<f32>,
    /// Columnar storage for signals.
    signal: Vec<f32>,
    /// Columnar storage for squared errors.
    error_sq: Vec<f32>,
}

impl EventBatch {
    /// Creates an empty batch for `num_dims`-dimensional events.
    #[must_use]
    pub fn new(num_dims: usize) -> Self {
        Self::with_capacity(num_dims, 0)
    }

    /// Creates a new empty batch with specified capacity.
    #[must_use]
    pub fn with_capacity(num_dims: usize, capacity: usize) -> Self {
        Self {
            num_dims,
            coords: Vec::with_capacity(capacity * num_dims),
            signal: Vec::with_capacity(capacity),
            error_sq: Vec::with_capacity(capacity),
        }
    }

    /// Number of dimensions per event.
    #[must_use]
    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    /// Returns the number of events in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signal.len()
    }

    /// Returns true if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }

    /// Clears all vectors in the batch.
    pub fn clear(&mut self) {
        self.coords.clear();
        self.signal.clear();
        self.error_sq.clear();
    }

    /// Releases the heap memory held by the batch.
    pub fn shrink_to_empty(&mut self) {
        self.coords = Vec::new();
        self.signal = Vec::new();
        self.error_sq = Vec::new();
    }

    /// Appends all events from another batch to this one.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the batches differ in dimensionality.
    pub fn append(&mut self, other: &EventBatch) -> Result<()> {
        if other.num_dims != self.num_dims {
            return Err(Error::DimensionMismatch {
                expected: self.num_dims,
                actual: other.num_dims,
            });
        }
        self.coords.extend_from_slice(&other.coords);
        self.signal.extend_from_slice(&other.signal);
        self.error_sq.extend_from_slice(&other.error_sq);
        Ok(())
    }

    /// Pushes a single event from its parts.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if `coords` has the wrong length.
    pub fn push_parts(&mut self, coords: &[f32], signal: f32, error_sq: f32) -> Result<()> {
        if coords.len() != self.num_dims {
            return Err(Error::DimensionMismatch {
                expected: self.num_dims,
                actual: coords.len(),
            });
        }
        self.coords.extend_from_slice(coords);
        self.signal.push(signal);
        self.error_sq.push(error_sq);
        Ok(())
    }

    /// Pushes a single event.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the event has the wrong dimensionality.
    pub fn push(&mut self, event: &MdEvent) -> Result<()> {
        self.push_parts(event.coords(), event.signal(), event.error_squared())
    }

    /// Pushes a borrowed event whose dimensionality is already known to match.
    pub(crate) fn push_ref(&mut self, event: EventRef<'_>) {
        debug_assert_eq!(event.coords.len(), self.num_dims);
        self.coords.extend_from_slice(event.coords);
        self.signal.push(event.signal);
        self.error_sq.push(event.error_sq);
    }

    /// Coordinates of event `index`.
    #[must_use]
    pub fn coords(&self, index: usize) -> &[f32] {
        let start = index * self.num_dims;
        &self.coords[start..start + self.num_dims]
    }

    /// Borrowed view of event `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> EventRef<'_> {
        EventRef {
            coords: self.coords(index),
            signal: self.signal[index],
            error_sq: self.error_sq[index],
        }
    }

    /// Iterates over the events in storage order.
    pub fn iter(&self) -> impl Iterator<Item = EventRef<'_>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Signals in storage order.
    #[must_use]
    pub fn signals(&self) -> &[f32] {
        &self.signal
    }

    /// Squared errors in storage order.
    #[must_use]
    pub fn errors_squared(&self) -> &[f32] {
        &self.error_sq
    }

    /// Sum of all signals, accumulated in double precision.
    #[must_use]
    pub fn total_signal(&self) -> f64 {
        self.signal.iter().map(|&s| f64::from(s)).sum()
    }

    /// Sum of all squared errors, accumulated in double precision.
    #[must_use]
    pub fn total_error_squared(&self) -> f64 {
        self.error_sq.iter().map(|&e| f64::from(e)).sum()
    }

    /// Copies the events out and sorts them by the event total order.
    #[must_use]
    pub fn to_sorted_events(&self) -> Vec<MdEvent> {
        let mut events: Vec<MdEvent> = self.iter().map(|e| e.to_event()).collect();
        events.sort();
        events
    }

    /// Number of bytes one event occupies in the byte encoding.
    #[must_use]
    pub fn bytes_per_event(num_dims: usize) -> usize {
        (num_dims + 2) * std::mem::size_of::<f32>()
    }

    /// Appends the little-endian encoding of every event to `out`.
    ///
    /// Format per event: `num_dims` x f32 coordinates, f32 signal, f32 error squared.
    pub fn write_le_bytes(&self, out: &mut Vec<u8>) {
        out.reserve(self.len() * Self::bytes_per_event(self.num_dims));
        for event in self.iter() {
            for c in event.coords {
                out.extend_from_slice(&c.to_le_bytes());
            }
            out.extend_from_slice(&event.signal.to_le_bytes());
            out.extend_from_slice(&event.error_sq.to_le_bytes());
        }
    }

    /// Decodes events written by [`Self::write_le_bytes`].
    ///
    /// # Errors
    /// Returns [`Error::Store`] if `bytes` is not a whole number of events.
    pub fn from_le_bytes(num_dims: usize, bytes: &[u8]) -> Result<Self> {
        let stride = Self::bytes_per_event(num_dims);
        if bytes.len() % stride != 0 {
            return Err(Error::store(format!(
                "{} bytes is not a multiple of the {stride}-byte event size",
                bytes.len()
            )));
        }
        let mut batch = Self::with_capacity(num_dims, bytes.len() / stride);
        for record in bytes.chunks_exact(stride) {
            let mut values = record
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
            for _ in 0..num_dims {
                batch.coords.extend(values.next());
            }
            batch.signal.extend(values.next());
            batch.error_sq.extend(values.next());
        }
        Ok(batch)
    }
}

impl FromIterator<MdEvent> for EventBatch {
    /// Builds a batch; the dimensionality is taken from the first event and
    /// events of any other dimensionality are skipped.
    fn from_iter<I: IntoIterator<Item = MdEvent>>(iter: I) -> Self {
        let mut iter = iter.into_iter().peekable();
        let num_dims = iter.peek().map_or(0, MdEvent::num_dims);
        let mut batch = Self::new(num_dims);
        for event in iter {
            if event.num_dims() == num_dims {
                batch.push_ref(event.view());
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_batch_operations() {
        let mut batch = EventBatch::with_capacity(2, 10);
        assert!(batch.is_empty());

        batch.push_parts(&[1.0, 2.0], 3.0, 4.0).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.coords(0), &[1.0, 2.0]);

        batch.push(&MdEvent::new(vec![5.0, 6.0], 7.0, 8.0)).unwrap();
        assert_eq!(batch.len(), 2);
        assert!((batch.total_signal() - 10.0).abs() < f64::EPSILON);
        assert!((batch.total_error_squared() - 12.0).abs() < f64::EPSILON);

        batch.clear();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_push_rejects_wrong_dimensionality() {
        let mut batch = EventBatch::new(3);
        let err = batch.push_parts(&[1.0], 1.0, 1.0).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_byte_encoding_preserves_events() {
        let batch: EventBatch = vec![
            MdEvent::new(vec![0.5, -1.25], 2.0, 0.25),
            MdEvent::new(vec![3.0, 4.0], 1.0, 1.0),
        ]
        .into_iter()
        .collect();

        let mut bytes = Vec::new();
        batch.write_le_bytes(&mut bytes);
        assert_eq!(bytes.len(), 2 * EventBatch::bytes_per_event(2));

        let decoded = EventBatch::from_le_bytes(2, &bytes).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_truncated_bytes_rejected() {
        let bytes = vec![0u8; 13];
        assert!(EventBatch::from_le_bytes(1, &bytes).is_err());
    }

    #[test]
    fn test_sorted_events() {
        let batch: EventBatch = vec![
            MdEvent::new(vec![2.0], 1.0, 1.0),
            MdEvent::new(vec![1.0], 1.0, 1.0),
        ]
        .into_iter()
        .collect();
        let sorted = batch.to_sorted_events();
        assert!((sorted[0].center(0) - 1.0).abs() < f32::EPSILON);
    }
}
