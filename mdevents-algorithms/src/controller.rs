//! Splitting policy and box-id allocation shared by every box of a tree.

use mdevents_core::{BoxControllerConfig, EventStore, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Run-local identifier of a box.
///
/// Ids come from a counter on the [`BoxController`]. Under parallel
/// splitting the order in which siblings draw ids is unspecified, so an id
/// is not a stable key across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoxId(pub u64);

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owns the splitting parameters of one box tree.
pub struct BoxController {
    num_dims: usize,
    config: BoxControllerConfig,
    split_into: Vec<usize>,
    children_per_split: usize,
    next_id: AtomicU64,
    dropped: AtomicUsize,
    store: Option<Arc<dyn EventStore>>,
}

impl BoxController {
    /// Validates `config` for an `num_dims` workspace and builds a controller.
    ///
    /// # Errors
    /// Returns [`mdevents_core::Error::Configuration`] for an invalid fan-out,
    /// a zero threshold or `min_depth > max_depth`.
    pub fn new(num_dims: usize, config: BoxControllerConfig) -> Result<Self> {
        let split_into = config.validate(num_dims)?;
        let children_per_split = split_into.iter().product();
        Ok(Self {
            num_dims,
            config,
            split_into,
            children_per_split,
            next_id: AtomicU64::new(0),
            dropped: AtomicUsize::new(0),
            store: None,
        })
    }

    /// Attaches the store that released leaves spill to.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the attached store.
    ///
    /// Leaves already released to the previous store can no longer be
    /// faulted in, so swap stores only on a fully resident tree.
    pub fn set_store(&mut self, store: Option<Arc<dyn EventStore>>) {
        self.store = store;
    }

    /// Number of dimensions of every box.
    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    /// The configuration the controller was built from.
    pub fn config(&self) -> &BoxControllerConfig {
        &self.config
    }

    /// Fan-out along each dimension.
    pub fn split_into(&self) -> &[usize] {
        &self.split_into
    }

    /// Number of children an interior box has.
    pub fn children_per_split(&self) -> usize {
        self.children_per_split
    }

    /// Event count above which a leaf splits.
    pub fn split_threshold(&self) -> usize {
        self.config.split_threshold
    }

    /// Depth at which boxes stop splitting.
    pub fn max_depth(&self) -> usize {
        self.config.max_depth
    }

    /// Whether a leaf holding `n_points` events at `depth` must split.
    #[inline]
    pub fn should_split(&self, n_points: usize, depth: usize) -> bool {
        n_points > self.config.split_threshold && depth < self.config.max_depth
    }

    /// Whether sibling boxes are split on the rayon pool.
    pub fn is_parallel(&self) -> bool {
        self.config.parallel
    }

    pub(crate) fn allocate_id(&self) -> BoxId {
        BoxId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of ids handed out so far, including boxes since merged away.
    pub fn ids_allocated(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    /// The attached event store, if any.
    pub fn store(&self) -> Option<&dyn EventStore> {
        self.store.as_deref()
    }

    pub(crate) fn record_dropped(&self, count: usize) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Events skipped because they fell outside the root extents.
    pub fn dropped_events(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for BoxController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxController")
            .field("num_dims", &self.num_dims)
            .field("split_into", &self.split_into)
            .field("split_threshold", &self.config.split_threshold)
            .field("max_depth", &self.config.max_depth)
            .field("ids_allocated", &self.ids_allocated())
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
