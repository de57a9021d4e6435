//! File-backed storage for released leaf events and memory budgeting.

use crate::{Error, Result};
use mdevents_algorithms::BoxTree;
use mdevents_core::{EventBatch, EventStore, StoreKey};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use sysinfo::System;

/// Bookkeeping slack per resident event on top of its encoded size.
const RESIDENT_EVENT_SLACK: f64 = 1.2;

/// How many events a box tree may keep in memory.
///
/// An explicit byte budget wins; otherwise the budget is a share of the
/// memory the operating system currently reports as available.
#[derive(Clone, Debug)]
pub struct OutOfCoreConfig {
    /// Share of available memory given to resident events, in `(0, 1]`.
    pub memory_fraction: f64,
    /// Fixed budget in bytes, overriding `memory_fraction`.
    pub memory_budget_bytes: Option<usize>,
}

impl Default for OutOfCoreConfig {
    fn default() -> Self {
        Self {
            memory_fraction: 0.5,
            memory_budget_bytes: None,
        }
    }
}

impl OutOfCoreConfig {
    /// Budget as a share of available memory.
    #[must_use]
    pub fn with_memory_fraction(mut self, memory_fraction: f64) -> Self {
        self.memory_fraction = memory_fraction;
        self
    }

    /// Fixed budget in bytes.
    #[must_use]
    pub fn with_memory_budget_bytes(mut self, budget: usize) -> Self {
        self.memory_budget_bytes = Some(budget);
        self
    }

    /// The budget in bytes.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBudget`] for a share outside `(0, 1]` or when
    /// the system reports no available memory.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn resolve_budget_bytes(&self) -> Result<usize> {
        if let Some(budget) = self.memory_budget_bytes {
            return Ok(budget);
        }
        let share = self.memory_fraction;
        if share <= 0.0 || share > 1.0 || share.is_nan() {
            return Err(Error::InvalidBudget(format!(
                "memory fraction {share} is outside (0.0, 1.0]"
            )));
        }
        let mut sys = System::new();
        sys.refresh_memory();
        let available = sys.available_memory();
        if available == 0 {
            return Err(Error::InvalidBudget(
                "the system reports no available memory".to_string(),
            ));
        }
        let bytes = (available as f64 * share).floor() as u64;
        Ok(usize::try_from(bytes).unwrap_or(usize::MAX))
    }

    /// Number of `num_dims`-dimensional events that fit in the budget.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBudget`] if the budget cannot be resolved.
    pub fn resolve_event_budget(&self, num_dims: usize) -> Result<usize> {
        let bytes = self.resolve_budget_bytes()?;
        Ok(events_within(bytes, EventBatch::bytes_per_event(num_dims)))
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn events_within(budget: usize, event_size: usize) -> usize {
    let per_event = event_size as f64 * RESIDENT_EVENT_SLACK;
    if per_event <= 0.0 {
        return 0;
    }
    (budget as f64 / per_event).floor() as usize
}

/// Releases the largest leaves of `tree` until its resident events fit the
/// configured budget. Returns the number of events released.
///
/// # Errors
/// Returns an error if the budget cannot be resolved or a leaf cannot be
/// written to the tree's store.
pub fn enforce_memory_budget(tree: &BoxTree, config: &OutOfCoreConfig) -> Result<usize> {
    let budget = config.resolve_event_budget(tree.num_dims())?;
    let released = tree.release_until(budget)?;
    if released > 0 {
        log::info!(
            "released {released} events to stay under a budget of {budget} events ({} resident)",
            tree.resident_events()
        );
    }
    Ok(released)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    offset: u64,
    capacity: u64,
    len: u64,
    events: usize,
}

#[derive(Debug)]
struct SpillFile {
    file: File,
    end: u64,
    slots: HashMap<StoreKey, Slot>,
    /// Reusable `(offset, capacity)` regions.
    holes: Vec<(u64, u64)>,
    next_key: u64,
}

impl SpillFile {
    /// First-fit placement of `len` bytes; appends when no hole is large enough.
    fn allocate(&mut self, len: u64) -> (u64, u64) {
        if let Some(pos) = self.holes.iter().position(|&(_, capacity)| capacity >= len) {
            return self.holes.swap_remove(pos);
        }
        let offset = self.end;
        self.end += len;
        (offset, len)
    }

    fn release(&mut self, slot: Slot) {
        if slot.capacity > 0 {
            self.holes.push((slot.offset, slot.capacity));
        }
    }
}

/// Event store backed by a single spill file.
///
/// Each released leaf occupies one region of the file. A leaf released again
/// after modification is rewritten in place when it still fits; otherwise
/// its old region joins a free list that later saves reuse.
#[derive(Debug)]
pub struct FileEventStore {
    path: PathBuf,
    inner: Mutex<SpillFile>,
}

impl FileEventStore {
    /// Creates (or truncates) the spill file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        log::debug!("spilling events to {}", path.as_ref().display());
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            inner: Mutex::new(SpillFile {
                file,
                end: 0,
                slots: HashMap::new(),
                holes: Vec::new(),
                next_key: 0,
            }),
        })
    }

    /// Path of the spill file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the spill file in bytes, holes included.
    pub fn file_len(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).end
    }

    /// Number of batches currently stored.
    pub fn batch_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .len()
    }
}

impl EventStore for FileEventStore {
    fn save(&self, previous: Option<StoreKey>, events: &EventBatch) -> mdevents_core::Result<StoreKey> {
        let mut bytes = Vec::new();
        events.write_le_bytes(&mut bytes);
        let len = bytes.len() as u64;

        let mut spill = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // The previous slot stays mapped until the new bytes are on disk.
        let old = previous.and_then(|key| spill.slots.get(&key).copied());
        let (offset, capacity, moved_from) = match old {
            Some(slot) if slot.capacity >= len => (slot.offset, slot.capacity, None),
            Some(slot) => {
                let (offset, capacity) = spill.allocate(len);
                (offset, capacity, Some(slot))
            }
            None => {
                let (offset, capacity) = spill.allocate(len);
                (offset, capacity, None)
            }
        };
        let slot = Slot {
            offset,
            capacity,
            len,
            events: events.len(),
        };

        let written = spill
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| spill.file.write_all(&bytes));
        if let Err(err) = written {
            if old.map_or(true, |previous| previous.offset != offset) {
                spill.release(slot);
            }
            return Err(err.into());
        }

        if let Some(previous) = moved_from {
            spill.release(previous);
        }
        let key = previous.unwrap_or_else(|| {
            let key = StoreKey(spill.next_key);
            spill.next_key += 1;
            key
        });
        spill.slots.insert(key, slot);
        Ok(key)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn load(&self, key: StoreKey, num_dims: usize) -> mdevents_core::Result<EventBatch> {
        let mut spill = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = *spill.slots.get(&key).ok_or_else(|| {
            mdevents_core::Error::store(format!("no batch stored under key {}", key.0))
        })?;
        let mut bytes = vec![0u8; slot.len as usize];
        spill.file.seek(SeekFrom::Start(slot.offset))?;
        spill.file.read_exact(&mut bytes)?;
        drop(spill);
        EventBatch::from_le_bytes(num_dims, &bytes)
    }

    fn free(&self, key: StoreKey) -> mdevents_core::Result<()> {
        let mut spill = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = spill.slots.remove(&key) {
            spill.release(slot);
        }
        Ok(())
    }

    fn stored_events(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .values()
            .map(|slot| slot.events)
            .sum()
    }
}
