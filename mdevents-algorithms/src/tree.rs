//! The box tree: a root box plus the controller that governs its splitting.

use crate::controller::BoxController;
use crate::node::{BoxContent, BoxNode};
use mdevents_core::{
    check_contains, BoxControllerConfig, Error, EventBatch, EventStore, Extent, MdEvent,
    OutOfBoundsPolicy, Progress, Result, WorkspaceDescriptor,
};
use std::sync::Arc;

/// Events inserted between two progress reports.
const INSERT_CHUNK: usize = 64 * 1024;

/// Adaptive spatial index over N-dimensional events.
///
/// Starts as a single leaf covering the full extents and grows by splitting
/// leaves whose event count exceeds the split threshold.
#[derive(Debug)]
pub struct BoxTree {
    controller: BoxController,
    root: BoxNode,
}

impl BoxTree {
    /// Creates an empty tree over `extents`.
    ///
    /// When the configuration sets a minimum depth, every box is split down
    /// to it straight away.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an invalid configuration.
    pub fn new(extents: Vec<Extent>, config: BoxControllerConfig) -> Result<Self> {
        let controller = BoxController::new(extents.len(), config)?;
        Self::with_controller(controller, extents)
    }

    /// Creates an empty tree over the descriptor's dimension ranges.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] for an empty dimension range or
    /// [`Error::Configuration`] for an invalid configuration.
    pub fn from_descriptor(descriptor: &WorkspaceDescriptor, config: BoxControllerConfig) -> Result<Self> {
        Self::new(descriptor.extents()?, config)
    }

    /// Creates an empty tree driven by an existing controller.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if the extents and the
    /// controller disagree on the dimensionality.
    pub fn with_controller(controller: BoxController, extents: Vec<Extent>) -> Result<Self> {
        if extents.len() != controller.num_dims() {
            return Err(Error::DimensionMismatch {
                expected: controller.num_dims(),
                actual: extents.len(),
            });
        }
        let root = BoxNode::leaf(&controller, extents, 0, None, EventBatch::new(controller.num_dims()));
        let mut tree = Self { controller, root };
        if let Some(min_depth) = tree.controller.config().min_depth {
            tree.set_min_recursion_depth(min_depth)?;
        }
        Ok(tree)
    }

    /// Attaches the store that released leaves spill to.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.controller.set_store(Some(store));
        self
    }

    /// The splitting controller.
    pub fn controller(&self) -> &BoxController {
        &self.controller
    }

    /// The root box.
    pub fn root(&self) -> &BoxNode {
        &self.root
    }

    /// Number of dimensions.
    pub fn num_dims(&self) -> usize {
        self.controller.num_dims()
    }

    /// Extents of the root box.
    pub fn extents(&self) -> &[Extent] {
        self.root.extents()
    }

    /// Inserts one event. Returns `false` when the event was dropped by the
    /// [`OutOfBoundsPolicy::Drop`] policy.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] under the default policy,
    /// [`Error::DimensionMismatch`] for the wrong coordinate count, or a
    /// store error if a released leaf cannot be faulted in.
    pub fn add_event(&mut self, event: &MdEvent) -> Result<bool> {
        if !self.accept(event.coords())? {
            return Ok(false);
        }
        self.root.add_event(&self.controller, event.view())?;
        Ok(true)
    }

    /// Inserts a batch of events, reporting progress in chunks. Returns the
    /// number of events inserted.
    ///
    /// Under [`OutOfBoundsPolicy::Reject`] the whole batch is checked before
    /// anything is inserted. Cancellation is observed between chunks; every
    /// chunk already inserted stays in the tree.
    ///
    /// # Errors
    /// Returns the first out-of-bounds or dimension error,
    /// [`Error::Cancelled`], or a store error.
    pub fn add_events(&mut self, events: &EventBatch, progress: &Progress) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        if events.num_dims() != self.num_dims() {
            return Err(Error::DimensionMismatch {
                expected: self.num_dims(),
                actual: events.num_dims(),
            });
        }

        let mut chunks: Vec<EventBatch> = Vec::new();
        for event in events.iter() {
            if !self.accept(event.coords)? {
                continue;
            }
            if chunks.last().map_or(true, |chunk| chunk.len() >= INSERT_CHUNK) {
                let capacity = INSERT_CHUNK.min(events.len());
                chunks.push(EventBatch::with_capacity(self.num_dims(), capacity));
            }
            if let Some(chunk) = chunks.last_mut() {
                chunk.push_parts(event.coords, event.signal, event.error_sq)?;
            }
        }

        let mut inserted = 0;
        for chunk in &chunks {
            progress.check()?;
            self.root.add_events(&self.controller, chunk)?;
            inserted += chunk.len();
            progress.advance(chunk.len())?;
        }
        Ok(inserted)
    }

    /// Applies the out-of-bounds policy; `Ok(false)` means drop.
    fn accept(&self, coords: &[f32]) -> Result<bool> {
        match check_contains(self.root.extents(), coords) {
            Ok(()) => Ok(true),
            Err(Error::OutOfBounds { .. })
                if self.controller.config().out_of_bounds == OutOfBoundsPolicy::Drop =>
            {
                self.controller.record_dropped(1);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Splits the root box once, whatever its event count.
    ///
    /// # Errors
    /// Returns a store error if the root's events cannot be faulted in.
    pub fn split_box(&mut self) -> Result<()> {
        self.root.split(&self.controller)
    }

    /// Splits every box shallower than `depth`, including empty ones.
    ///
    /// The number of boxes grows as `SplitInto^(N * depth)`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `depth` exceeds the maximum depth.
    pub fn set_min_recursion_depth(&mut self, depth: usize) -> Result<()> {
        if depth > self.controller.max_depth() {
            return Err(Error::config(format!(
                "MinRecursionDepth ({depth}) must be <= MaxRecursionDepth ({})",
                self.controller.max_depth()
            )));
        }
        self.root.split_to_depth(&self.controller, depth)?;
        log::debug!("tree split down to depth {depth}: {} boxes", self.box_count());
        Ok(())
    }

    /// Boxes in pre-order, descending no deeper than `max_depth`.
    ///
    /// With `leaves_only`, interior boxes are skipped unless they sit at
    /// `max_depth`.
    pub fn get_boxes(&self, max_depth: usize, leaves_only: bool) -> Vec<&BoxNode> {
        let mut boxes = Vec::new();
        self.root.collect_boxes(max_depth, leaves_only, &mut boxes);
        boxes
    }

    /// Every box in pre-order.
    pub fn boxes(&self) -> Vec<&BoxNode> {
        self.get_boxes(usize::MAX, false)
    }

    /// Every leaf in pre-order.
    pub fn leaves(&self) -> Vec<&BoxNode> {
        self.get_boxes(usize::MAX, true)
    }

    /// Total number of boxes.
    pub fn box_count(&self) -> usize {
        self.boxes().len()
    }

    /// Depth of the deepest box.
    pub fn max_depth_reached(&self) -> usize {
        self.boxes().iter().map(|b| b.depth()).max().unwrap_or(0)
    }

    /// Number of events in the tree.
    pub fn n_points(&self) -> usize {
        self.root.n_points()
    }

    /// Summed signal of every event.
    pub fn total_signal(&self) -> f64 {
        self.root.signal()
    }

    /// Summed squared error of every event.
    pub fn total_error_squared(&self) -> f64 {
        self.root.error_squared()
    }

    /// Events skipped by the [`OutOfBoundsPolicy::Drop`] policy.
    pub fn dropped_events(&self) -> usize {
        self.controller.dropped_events()
    }

    /// The leaf containing `coords`, or `None` outside the root.
    pub fn box_at(&self, coords: &[f32]) -> Option<&BoxNode> {
        if !self.root.contains(coords) {
            return None;
        }
        self.root.find(&self.controller, coords)
    }

    /// Signal per unit volume of the leaf containing `coords`.
    pub fn signal_at(&self, coords: &[f32]) -> Option<f64> {
        self.box_at(coords).map(BoxNode::signal_normalized)
    }

    /// Calls `f` with every leaf and its events, faulting released leaves
    /// in and out again.
    ///
    /// # Errors
    /// Propagates store errors and any error returned by `f`.
    pub fn for_each_leaf<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&BoxNode, &EventBatch) -> Result<()>,
    {
        for node in self.leaves() {
            if let BoxContent::Leaf(leaf) = node.content() {
                leaf.inspect(&self.controller, |events| f(node, events))??;
            }
        }
        Ok(())
    }

    /// Copies every event of the tree into one batch.
    ///
    /// # Errors
    /// Returns a store error if a released leaf cannot be faulted in.
    pub fn collect_events(&self) -> Result<EventBatch> {
        let mut all = EventBatch::with_capacity(self.num_dims(), self.n_points());
        self.for_each_leaf(|_, events| all.append(events))?;
        Ok(all)
    }

    /// Adds every event of `other`, which must cover the same extents.
    /// Returns the number of events added.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when the extents differ, or any
    /// insertion error.
    pub fn merge_from(&mut self, other: &BoxTree) -> Result<usize> {
        if self.extents() != other.extents() {
            return Err(Error::config("cannot merge box trees with different extents"));
        }
        let events = other.collect_events()?;
        let added = self.add_events(&events, &Progress::silent())?;
        log::debug!("merged {added} events into the tree");
        Ok(added)
    }

    /// Collapses sparse interior boxes back into leaves. Returns the number
    /// of boxes removed.
    ///
    /// # Errors
    /// Returns a store error if released events cannot be faulted in.
    pub fn coarsen(&mut self) -> Result<usize> {
        self.root.coarsen(&self.controller)
    }

    /// Recomputes every cached aggregate from the events.
    ///
    /// # Errors
    /// Returns a store error if released events cannot be faulted in.
    pub fn refresh_cache(&mut self) -> Result<()> {
        self.root.refresh_cache(&self.controller)
    }

    /// Checks the structural invariants of the whole tree.
    ///
    /// # Errors
    /// Returns [`Error::StructuralInvariant`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.root.depth() != 0 || self.root.parent().is_some() {
            return Err(Error::StructuralInvariant("root box is not at depth 0".to_string()));
        }
        self.root.validate(&self.controller)
    }

    /// Number of events currently held in memory.
    pub fn resident_events(&self) -> usize {
        self.leaves()
            .iter()
            .filter_map(|node| node.as_leaf())
            .map(|leaf| leaf.resident_len())
            .sum()
    }

    /// Releases every leaf to the attached store. Returns the number of
    /// events released; 0 when no store is attached.
    ///
    /// # Errors
    /// Returns a store error if a write fails.
    pub fn release_all(&self) -> Result<usize> {
        let released = self.root.release_all(&self.controller)?;
        log::debug!("released {released} events from memory");
        Ok(released)
    }

    /// Releases the largest resident leaves until at most `budget_events`
    /// events remain in memory. Returns the number of events released.
    ///
    /// # Errors
    /// Returns a store error if a write fails.
    pub fn release_until(&self, budget_events: usize) -> Result<usize> {
        if self.controller.store().is_none() {
            return Ok(0);
        }
        let mut leaves: Vec<_> = self
            .leaves()
            .into_iter()
            .filter_map(|node| node.as_leaf())
            .map(|leaf| (leaf.resident_len(), leaf))
            .filter(|(len, _)| *len > 0)
            .collect();
        leaves.sort_by(|a, b| b.0.cmp(&a.0));

        let mut resident: usize = leaves.iter().map(|(len, _)| len).sum();
        let mut released = 0;
        for (_, leaf) in leaves {
            if resident <= budget_events {
                break;
            }
            let count = leaf.release(&self.controller)?;
            resident -= count;
            released += count;
        }
        log::debug!("released {released} events to stay under {budget_events} resident");
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdevents_core::{MemoryEventStore, SplitInto};

    fn line(threshold: usize) -> BoxTree {
        let config = BoxControllerConfig::new()
            .with_split_into(SplitInto::Uniform(5))
            .with_split_threshold(threshold)
            .with_max_depth(3);
        BoxTree::new(vec![Extent::new(0.0, 100.0).unwrap()], config).unwrap()
    }

    #[allow(clippy::cast_precision_loss)]
    fn spread(n: usize) -> EventBatch {
        (0..n)
            .map(|i| MdEvent::unweighted(vec![(i as f32 * 100.0) / n as f32]))
            .collect()
    }

    #[test]
    fn test_empty_tree() {
        let tree = line(10);
        assert_eq!(tree.box_count(), 1);
        assert_eq!(tree.n_points(), 0);
        assert!(tree.root().is_leaf());
        tree.validate().unwrap();
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut tree = line(10);
        let err = tree.add_event(&MdEvent::unweighted(vec![100.0])).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { dimension: 0, .. }));
        assert_eq!(tree.n_points(), 0);

        let mut batch = spread(5);
        batch.push_parts(&[-1.0], 1.0, 1.0).unwrap();
        assert!(tree.add_events(&batch, &Progress::silent()).is_err());
        assert_eq!(tree.n_points(), 0);
    }

    #[test]
    fn test_out_of_bounds_dropped() {
        let config = BoxControllerConfig::new().with_out_of_bounds(OutOfBoundsPolicy::Drop);
        let mut tree = BoxTree::new(vec![Extent::new(0.0, 1.0).unwrap()], config).unwrap();
        assert!(!tree.add_event(&MdEvent::unweighted(vec![2.0])).unwrap());
        assert!(tree.add_event(&MdEvent::unweighted(vec![0.5])).unwrap());
        assert_eq!(tree.dropped_events(), 1);
        assert_eq!(tree.n_points(), 1);
        assert!(matches!(
            tree.add_event(&MdEvent::unweighted(vec![0.5, 0.5])),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_batch_insert_splits_recursively() {
        let mut tree = line(10);
        let inserted = tree.add_events(&spread(500), &Progress::silent()).unwrap();
        assert_eq!(inserted, 500);
        assert_eq!(tree.n_points(), 500);
        assert!(tree.max_depth_reached() >= 2);
        tree.validate().unwrap();
        for leaf in tree.leaves() {
            assert!(leaf.n_points() <= 10 || leaf.depth() == 3);
        }
    }

    #[test]
    fn test_get_boxes_depth_limit() {
        let mut tree = line(10);
        tree.set_min_recursion_depth(2).unwrap();
        assert_eq!(tree.box_count(), 1 + 5 + 25);
        assert_eq!(tree.get_boxes(1, false).len(), 6);
        // Interior boxes at the depth limit count as leaves.
        assert_eq!(tree.get_boxes(1, true).len(), 5);
        assert_eq!(tree.leaves().len(), 25);
        assert!(tree.set_min_recursion_depth(4).is_err());
    }

    #[test]
    fn test_point_queries() {
        let mut tree = line(1000);
        tree.split_box().unwrap();
        tree.add_event(&MdEvent::new(vec![30.0], 4.0, 1.0)).unwrap();
        let node = tree.box_at(&[35.0]).unwrap();
        assert_eq!(node.depth(), 1);
        assert!((node.extents()[0].min - 20.0).abs() < f64::EPSILON);
        assert!((tree.signal_at(&[30.0]).unwrap() - 0.2).abs() < 1e-12);
        assert!(tree.box_at(&[100.0]).is_none());
    }

    #[test]
    fn test_merge_and_coarsen() {
        let mut a = line(10);
        let mut b = line(10);
        a.add_events(&spread(40), &Progress::silent()).unwrap();
        b.add_events(&spread(40), &Progress::silent()).unwrap();
        assert_eq!(a.merge_from(&b).unwrap(), 40);
        assert_eq!(a.n_points(), 80);
        a.validate().unwrap();

        let mut sparse = line(1000);
        sparse.set_min_recursion_depth(1).unwrap();
        sparse.add_events(&spread(20), &Progress::silent()).unwrap();
        assert_eq!(sparse.coarsen().unwrap(), 5);
        assert_eq!(sparse.box_count(), 1);
        assert_eq!(sparse.n_points(), 20);
    }

    #[test]
    fn test_release_until_budget() {
        let store = Arc::new(MemoryEventStore::new());
        let mut tree = line(1000).with_store(store.clone());
        tree.split_box().unwrap();
        tree.add_events(&spread(100), &Progress::silent()).unwrap();
        assert_eq!(tree.resident_events(), 100);

        let released = tree.release_until(50).unwrap();
        assert!(tree.resident_events() <= 50);
        assert_eq!(store.stored_events(), released);

        tree.refresh_cache().unwrap();
        assert_eq!(tree.n_points(), 100);
        assert_eq!(tree.collect_events().unwrap().len(), 100);
        assert!(tree.resident_events() <= 50);
    }

    #[test]
    fn test_cancelled_insert() {
        let mut tree = line(1000);
        let token = mdevents_core::CancellationToken::new();
        token.cancel();
        let progress = Progress::new(10).with_token(token);
        assert!(matches!(
            tree.add_events(&spread(10), &progress),
            Err(Error::Cancelled)
        ));
        assert_eq!(tree.n_points(), 0);
    }
}
