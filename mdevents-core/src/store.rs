//! Secondary storage for released leaf events.
//!
//! A leaf box that releases its events hands them to an [`EventStore`] and
//! keeps only the returned [`StoreKey`]. The next acquire faults the batch
//! back in through [`EventStore::load`].

use crate::error::{Error, Result};
use crate::soa::EventBatch;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Opaque handle to a stored batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey(pub u64);

/// Backing storage used by out-of-core box trees.
///
/// Implementations must be safe to call from several leaves at once.
pub trait EventStore: Send + Sync {
    /// Writes `events`, reusing or freeing `previous` if given, and returns
    /// the key under which they can be loaded.
    ///
    /// # Errors
    /// Returns [`Error::Store`] or [`Error::Io`] if the write fails.
    fn save(&self, previous: Option<StoreKey>, events: &EventBatch) -> Result<StoreKey>;

    /// Reads back the batch stored under `key`.
    ///
    /// # Errors
    /// Returns [`Error::Store`] for an unknown key or corrupt data.
    fn load(&self, key: StoreKey, num_dims: usize) -> Result<EventBatch>;

    /// Forgets the batch stored under `key`.
    ///
    /// # Errors
    /// Returns [`Error::Store`] if the storage cannot be reclaimed.
    fn free(&self, key: StoreKey) -> Result<()>;

    /// Number of events currently held.
    fn stored_events(&self) -> usize;
}

/// Event store that keeps encoded batches in memory.
///
/// Mostly useful for tests and for exercising the release protocol without
/// touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    batches: Mutex<HashMap<StoreKey, (usize, Vec<u8>)>>,
    next_key: AtomicU64,
    saves: AtomicUsize,
    loads: AtomicUsize,
}

impl MemoryEventStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    /// Number of completed loads.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl EventStore for MemoryEventStore {
    fn save(&self, previous: Option<StoreKey>, events: &EventBatch) -> Result<StoreKey> {
        let key = previous.unwrap_or_else(|| StoreKey(self.next_key.fetch_add(1, Ordering::Relaxed)));
        let mut bytes = Vec::new();
        events.write_le_bytes(&mut bytes);
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, (events.len(), bytes));
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(key)
    }

    fn load(&self, key: StoreKey, num_dims: usize) -> Result<EventBatch> {
        let batches = self.batches.lock().unwrap_or_else(PoisonError::into_inner);
        let (_, bytes) = batches
            .get(&key)
            .ok_or_else(|| Error::store(format!("no batch stored under key {}", key.0)))?;
        let batch = EventBatch::from_le_bytes(num_dims, bytes)?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(batch)
    }

    fn free(&self, key: StoreKey) -> Result<()> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        Ok(())
    }

    fn stored_events(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|(count, _)| count)
            .sum()
    }
}
