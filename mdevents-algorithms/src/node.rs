//! Box nodes: leaves buffering events and interior grids of children.
//!
//! A box is either a leaf or an interior grid, never both; the
//! [`BoxContent`] enum makes that static. Leaves keep their events behind a
//! per-leaf mutex so that two readers faulting in the same leaf are
//! serialized, and so that a released leaf can be re-faulted through a
//! shared reference.

use crate::controller::{BoxController, BoxId};
use mdevents_core::{volume, Error, EventBatch, EventRef, Extent, Result, StoreKey};
use rayon::prelude::*;
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Relative tolerance used when validating cached aggregates.
const AGGREGATE_TOLERANCE: f64 = 1e-6;

#[derive(Debug)]
struct LeafData {
    events: EventBatch,
    /// False once the events live only in the store.
    resident: bool,
    key: Option<StoreKey>,
    /// The in-memory events differ from the stored copy.
    dirty: bool,
}

impl LeafData {
    fn fault_in(&mut self, controller: &BoxController) -> Result<()> {
        if self.resident {
            return Ok(());
        }
        let (Some(store), Some(key)) = (controller.store(), self.key) else {
            return Err(Error::store("released leaf has no backing store"));
        };
        self.events = store.load(key, controller.num_dims())?;
        self.resident = true;
        self.dirty = false;
        Ok(())
    }

    fn spill(&mut self, controller: &BoxController) -> Result<usize> {
        let Some(store) = controller.store() else {
            return Ok(0);
        };
        if !self.resident || (self.events.is_empty() && self.key.is_none()) {
            return Ok(0);
        }
        if self.dirty || self.key.is_none() {
            self.key = Some(store.save(self.key, &self.events)?);
        }
        let released = self.events.len();
        self.events = EventBatch::new(controller.num_dims());
        self.resident = false;
        self.dirty = false;
        Ok(released)
    }
}

/// Event storage of a leaf box.
#[derive(Debug)]
pub struct LeafBox {
    data: Mutex<LeafData>,
}

/// Scoped access to a leaf's events; the leaf stays locked while it lives.
///
/// Drop the guard before calling [`LeafBox::release`] on the same leaf.
#[derive(Debug)]
pub struct EventsGuard<'a> {
    data: MutexGuard<'a, LeafData>,
}

impl Deref for EventsGuard<'_> {
    type Target = EventBatch;

    fn deref(&self) -> &EventBatch {
        &self.data.events
    }
}

impl LeafBox {
    fn new(events: EventBatch) -> Self {
        Self {
            data: Mutex::new(LeafData {
                events,
                resident: true,
                key: None,
                dirty: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LeafData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn data_mut(&mut self) -> &mut LeafData {
        self.data.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Faults the events in (if released) and locks them for reading.
    ///
    /// # Errors
    /// Returns [`Error::Store`] if the stored copy cannot be loaded.
    pub fn acquire(&self, controller: &BoxController) -> Result<EventsGuard<'_>> {
        let mut data = self.lock();
        data.fault_in(controller)?;
        Ok(EventsGuard { data })
    }

    /// Writes the events to the controller's store and drops them from
    /// memory. Returns the number of events released; a tree without a
    /// store keeps everything resident and returns 0.
    ///
    /// # Errors
    /// Returns [`Error::Store`] or [`Error::Io`] if the write fails.
    pub fn release(&self, controller: &BoxController) -> Result<usize> {
        self.lock().spill(controller)
    }

    /// Whether the events are currently in memory.
    pub fn is_resident(&self) -> bool {
        self.lock().resident
    }

    /// Number of events currently held in memory.
    pub fn resident_len(&self) -> usize {
        let data = self.lock();
        if data.resident {
            data.events.len()
        } else {
            0
        }
    }

    /// Runs `f` on the events, restoring the released state afterwards.
    pub(crate) fn inspect<R>(&self, controller: &BoxController, f: impl FnOnce(&EventBatch) -> R) -> Result<R> {
        let mut data = self.lock();
        let was_resident = data.resident;
        data.fault_in(controller)?;
        let result = f(&data.events);
        if !was_resident {
            data.spill(controller)?;
        }
        Ok(result)
    }

    fn events_mut(&mut self, controller: &BoxController) -> Result<&mut EventBatch> {
        let data = self.data_mut();
        data.fault_in(controller)?;
        data.dirty = true;
        Ok(&mut data.events)
    }

    /// Moves the events out and frees their stored copy.
    fn take_events(&mut self, controller: &BoxController) -> Result<EventBatch> {
        let num_dims = controller.num_dims();
        let data = self.data_mut();
        data.fault_in(controller)?;
        if let (Some(store), Some(key)) = (controller.store(), data.key.take()) {
            store.free(key)?;
        }
        data.dirty = true;
        Ok(std::mem::replace(&mut data.events, EventBatch::new(num_dims)))
    }

    fn discard(&mut self, controller: &BoxController) -> Result<()> {
        let data = self.data_mut();
        if let (Some(store), Some(key)) = (controller.store(), data.key.take()) {
            store.free(key)?;
        }
        data.events.shrink_to_empty();
        Ok(())
    }
}

/// What a box holds.
#[derive(Debug)]
pub enum BoxContent {
    /// A leaf with buffered events.
    Leaf(LeafBox),
    /// An interior box with `SplitInto^N` children, dimension 0 varying fastest.
    Grid(Vec<BoxNode>),
}

/// One box of the spatial tree.
#[derive(Debug)]
pub struct BoxNode {
    id: BoxId,
    depth: usize,
    parent: Option<BoxId>,
    extents: Vec<Extent>,
    inverse_volume: f64,
    signal: f64,
    error_sq: f64,
    n_points: usize,
    content: BoxContent,
}

impl BoxNode {
    /// Creates a leaf holding `events`, drawing an id from `controller`.
    pub(crate) fn leaf(
        controller: &BoxController,
        extents: Vec<Extent>,
        depth: usize,
        parent: Option<BoxId>,
        events: EventBatch,
    ) -> Self {
        let inverse_volume = 1.0 / volume(&extents);
        Self {
            id: controller.allocate_id(),
            depth,
            parent,
            extents,
            inverse_volume,
            signal: events.total_signal(),
            error_sq: events.total_error_squared(),
            n_points: events.len(),
            content: BoxContent::Leaf(LeafBox::new(events)),
        }
    }

    /// Run-local id of the box.
    pub fn id(&self) -> BoxId {
        self.id
    }

    /// Depth below the root, which is at depth 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Id of the parent box; `None` for the root.
    pub fn parent(&self) -> Option<BoxId> {
        self.parent
    }

    /// The `[min, max)` range of the box along each dimension.
    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }

    /// Cached `1 / volume`.
    pub fn inverse_volume(&self) -> f64 {
        self.inverse_volume
    }

    /// Summed signal of every event in the box.
    pub fn signal(&self) -> f64 {
        self.signal
    }

    /// Summed squared error of every event in the box.
    pub fn error_squared(&self) -> f64 {
        self.error_sq
    }

    /// Signal per unit volume.
    pub fn signal_normalized(&self) -> f64 {
        self.signal * self.inverse_volume
    }

    /// Number of events in the box and all its descendants.
    pub fn n_points(&self) -> usize {
        self.n_points
    }

    /// What the box holds.
    pub fn content(&self) -> &BoxContent {
        &self.content
    }

    /// True for a leaf box.
    pub fn is_leaf(&self) -> bool {
        matches!(self.content, BoxContent::Leaf(_))
    }

    /// The leaf storage, or `None` for an interior box.
    pub fn as_leaf(&self) -> Option<&LeafBox> {
        match &self.content {
            BoxContent::Leaf(leaf) => Some(leaf),
            BoxContent::Grid(_) => None,
        }
    }

    /// Children in index order; empty for a leaf.
    pub fn children(&self) -> &[BoxNode] {
        match &self.content {
            BoxContent::Leaf(_) => &[],
            BoxContent::Grid(children) => children,
        }
    }

    /// Number of children.
    pub fn num_children(&self) -> usize {
        self.children().len()
    }

    /// Whether `coords` lies inside the box.
    pub fn contains(&self, coords: &[f32]) -> bool {
        coords.len() == self.extents.len()
            && self
                .extents
                .iter()
                .zip(coords)
                .all(|(extent, &c)| extent.contains(f64::from(c)))
    }

    /// Appends the boxes of this subtree in pre-order.
    ///
    /// A box is listed when `leaves_only` is false, when it is a leaf, or
    /// when it sits at `max_depth`; recursion stops at `max_depth`.
    pub(crate) fn collect_boxes<'a>(&'a self, max_depth: usize, leaves_only: bool, out: &mut Vec<&'a BoxNode>) {
        if !leaves_only || self.is_leaf() || self.depth == max_depth {
            out.push(self);
        }
        if self.depth < max_depth {
            for child in self.children() {
                child.collect_boxes(max_depth, leaves_only, out);
            }
        }
    }

    /// The deepest box containing `coords`, assuming it lies inside `self`.
    pub(crate) fn find(&self, controller: &BoxController, coords: &[f32]) -> Option<&BoxNode> {
        match &self.content {
            BoxContent::Leaf(_) => Some(self),
            BoxContent::Grid(children) => {
                let index = child_index(&self.extents, controller.split_into(), coords)?;
                children.get(index)?.find(controller, coords)
            }
        }
    }

    /// Adds one event known to lie inside the box.
    pub(crate) fn add_event(&mut self, controller: &BoxController, event: EventRef<'_>) -> Result<()> {
        match &mut self.content {
            BoxContent::Leaf(leaf) => {
                leaf.events_mut(controller)?
                    .push_parts(event.coords, event.signal, event.error_sq)?;
            }
            BoxContent::Grid(children) => {
                let child = child_index(&self.extents, controller.split_into(), event.coords)
                    .and_then(|index| children.get_mut(index))
                    .ok_or_else(|| escaped(self.id, event.coords))?;
                child.add_event(controller, event)?;
            }
        }
        self.signal += f64::from(event.signal);
        self.error_sq += f64::from(event.error_sq);
        self.n_points += 1;
        if self.is_leaf() && controller.should_split(self.n_points, self.depth) {
            self.split(controller)?;
        }
        Ok(())
    }

    /// Adds a batch of events known to lie inside the box.
    pub(crate) fn add_events(&mut self, controller: &BoxController, events: &EventBatch) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        match &mut self.content {
            BoxContent::Leaf(leaf) => {
                leaf.events_mut(controller)?.append(events)?;
                self.signal += events.total_signal();
                self.error_sq += events.total_error_squared();
                self.n_points += events.len();
                if controller.should_split(self.n_points, self.depth) {
                    self.split(controller)?;
                }
            }
            BoxContent::Grid(children) => {
                let parts = partition(&self.extents, controller, events, self.id)?;
                let inserted = if controller.is_parallel() {
                    children
                        .par_iter_mut()
                        .zip(parts.par_iter())
                        .try_for_each(|(child, part)| child.add_events(controller, part))
                } else {
                    children
                        .iter_mut()
                        .zip(&parts)
                        .try_for_each(|(child, part)| child.add_events(controller, part))
                };
                // Children that took their part keep it, so the totals follow them.
                self.recompute_from_children();
                inserted?;
            }
        }
        Ok(())
    }

    /// Turns a leaf into a grid of `SplitInto^N` children.
    ///
    /// All children are built and filled before the box changes, so a
    /// failure leaves the leaf intact. Children above the split threshold
    /// split in turn. Interior boxes and boxes at the maximum depth are left
    /// alone.
    pub(crate) fn split(&mut self, controller: &BoxController) -> Result<()> {
        if self.depth >= controller.max_depth() {
            return Ok(());
        }
        let BoxContent::Leaf(leaf) = &mut self.content else {
            return Ok(());
        };
        let events = leaf.events_mut(controller)?;
        let parts = partition(&self.extents, controller, events, self.id)?;

        let mut children: Vec<BoxNode> = parts
            .into_iter()
            .enumerate()
            .map(|(index, part)| {
                let extents = child_extents(&self.extents, controller.split_into(), index);
                BoxNode::leaf(controller, extents, self.depth + 1, Some(self.id), part)
            })
            .collect();

        let split_child = |child: &mut BoxNode| -> Result<()> {
            if controller.should_split(child.n_points, child.depth) {
                child.split(controller)
            } else {
                Ok(())
            }
        };
        if controller.is_parallel() {
            children.par_iter_mut().try_for_each(split_child)?;
        } else {
            children.iter_mut().try_for_each(split_child)?;
        }

        log::debug!(
            "split box {} at depth {} into {} children ({} events)",
            self.id,
            self.depth,
            children.len(),
            self.n_points
        );
        leaf.discard(controller)?;
        self.content = BoxContent::Grid(children);
        self.recompute_from_children();
        Ok(())
    }

    /// Splits every leaf shallower than `min_depth`, empty or not.
    pub(crate) fn split_to_depth(&mut self, controller: &BoxController, min_depth: usize) -> Result<()> {
        if self.depth >= min_depth {
            return Ok(());
        }
        if self.is_leaf() {
            self.split(controller)?;
        }
        if let BoxContent::Grid(children) = &mut self.content {
            if controller.is_parallel() {
                children
                    .par_iter_mut()
                    .try_for_each(|child| child.split_to_depth(controller, min_depth))?;
            } else {
                for child in children.iter_mut() {
                    child.split_to_depth(controller, min_depth)?;
                }
            }
        }
        Ok(())
    }

    fn recompute_from_children(&mut self) {
        if let BoxContent::Grid(children) = &self.content {
            self.signal = children.iter().map(|c| c.signal).sum();
            self.error_sq = children.iter().map(|c| c.error_sq).sum();
            self.n_points = children.iter().map(|c| c.n_points).sum();
        }
    }

    /// Recomputes every aggregate from the events, bottom-up.
    pub(crate) fn refresh_cache(&mut self, controller: &BoxController) -> Result<()> {
        match &mut self.content {
            BoxContent::Leaf(leaf) => {
                let (signal, error_sq, n_points) = leaf.inspect(controller, |events| {
                    (events.total_signal(), events.total_error_squared(), events.len())
                })?;
                self.signal = signal;
                self.error_sq = error_sq;
                self.n_points = n_points;
            }
            BoxContent::Grid(children) => {
                for child in children.iter_mut() {
                    child.refresh_cache(controller)?;
                }
                self.recompute_from_children();
            }
        }
        Ok(())
    }

    /// Collapses interior boxes holding no more than the split threshold
    /// back into leaves. Boxes shallower than the minimum depth stay split.
    /// Returns the number of boxes removed.
    pub(crate) fn coarsen(&mut self, controller: &BoxController) -> Result<usize> {
        let BoxContent::Grid(children) = &mut self.content else {
            return Ok(0);
        };
        let mut removed = 0;
        for child in children.iter_mut() {
            removed += child.coarsen(controller)?;
        }
        let min_depth = controller.config().min_depth.unwrap_or(0);
        if self.n_points > controller.split_threshold() || self.depth < min_depth {
            return Ok(removed);
        }

        let mut merged = EventBatch::with_capacity(controller.num_dims(), self.n_points);
        for child in children.iter_mut() {
            removed += child.drain_into(controller, &mut merged)?;
        }
        log::debug!("merged box {} back into a leaf of {} events", self.id, merged.len());
        self.content = BoxContent::Leaf(LeafBox::new(merged));
        Ok(removed)
    }

    /// Moves every event of the subtree into `out`; returns the subtree's box count.
    fn drain_into(&mut self, controller: &BoxController, out: &mut EventBatch) -> Result<usize> {
        match &mut self.content {
            BoxContent::Leaf(leaf) => {
                out.append(&leaf.take_events(controller)?)?;
                Ok(1)
            }
            BoxContent::Grid(children) => {
                let mut count = 1;
                for child in children.iter_mut() {
                    count += child.drain_into(controller, out)?;
                }
                Ok(count)
            }
        }
    }

    /// Releases every leaf of the subtree; returns the number of events released.
    pub(crate) fn release_all(&self, controller: &BoxController) -> Result<usize> {
        match &self.content {
            BoxContent::Leaf(leaf) => leaf.release(controller),
            BoxContent::Grid(children) => {
                let mut released = 0;
                for child in children {
                    released += child.release_all(controller)?;
                }
                Ok(released)
            }
        }
    }

    /// Checks the structural invariants of the subtree.
    pub(crate) fn validate(&self, controller: &BoxController) -> Result<()> {
        let expected_inverse = 1.0 / volume(&self.extents);
        if !close(self.inverse_volume, expected_inverse) {
            return Err(invariant(format!(
                "box {} caches inverse volume {} instead of {expected_inverse}",
                self.id, self.inverse_volume
            )));
        }
        match &self.content {
            BoxContent::Leaf(leaf) => {
                let data = leaf.lock();
                if !data.resident {
                    return Ok(());
                }
                if data.events.len() != self.n_points {
                    return Err(invariant(format!(
                        "leaf {} counts {} events but holds {}",
                        self.id,
                        self.n_points,
                        data.events.len()
                    )));
                }
                if let Some(event) = data.events.iter().find(|e| !self.contains(e.coords)) {
                    return Err(invariant(format!("leaf {} holds outside event {event}", self.id)));
                }
                Ok(())
            }
            BoxContent::Grid(children) => {
                if children.len() != controller.children_per_split() {
                    return Err(invariant(format!(
                        "box {} has {} children instead of {}",
                        self.id,
                        children.len(),
                        controller.children_per_split()
                    )));
                }
                for (index, child) in children.iter().enumerate() {
                    if child.depth != self.depth + 1 || child.parent != Some(self.id) {
                        return Err(invariant(format!(
                            "box {} is not a direct child of box {}",
                            child.id, self.id
                        )));
                    }
                    if child.extents != child_extents(&self.extents, controller.split_into(), index) {
                        return Err(invariant(format!(
                            "children of box {} do not partition its extents",
                            self.id
                        )));
                    }
                    child.validate(controller)?;
                }
                let n_points: usize = children.iter().map(|c| c.n_points).sum();
                let signal: f64 = children.iter().map(|c| c.signal).sum();
                let error_sq: f64 = children.iter().map(|c| c.error_sq).sum();
                if n_points != self.n_points || !close(signal, self.signal) || !close(error_sq, self.error_sq) {
                    return Err(invariant(format!(
                        "aggregates of box {} disagree with its children",
                        self.id
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Linear index of the child containing `coords`, dimension 0 varying fastest.
pub(crate) fn child_index(extents: &[Extent], split_into: &[usize], coords: &[f32]) -> Option<usize> {
    let mut index = 0;
    let mut stride = 1;
    for ((extent, &parts), &c) in extents.iter().zip(split_into).zip(coords) {
        index += extent.sub_index(f64::from(c), parts)? * stride;
        stride *= parts;
    }
    Some(index)
}

fn child_extents(extents: &[Extent], split_into: &[usize], index: usize) -> Vec<Extent> {
    let mut remainder = index;
    extents
        .iter()
        .zip(split_into)
        .map(|(extent, &parts)| {
            let i = remainder % parts;
            remainder /= parts;
            extent.sub_extent(i, parts)
        })
        .collect()
}

/// Sorts `events` into one batch per child of a box with `extents`.
fn partition(
    extents: &[Extent],
    controller: &BoxController,
    events: &EventBatch,
    id: BoxId,
) -> Result<Vec<EventBatch>> {
    let mut parts = vec![EventBatch::new(controller.num_dims()); controller.children_per_split()];
    for event in events.iter() {
        let part = child_index(extents, controller.split_into(), event.coords)
            .and_then(|index| parts.get_mut(index))
            .ok_or_else(|| escaped(id, event.coords))?;
        part.push_parts(event.coords, event.signal, event.error_sq)?;
    }
    Ok(parts)
}

fn escaped(id: BoxId, coords: &[f32]) -> Error {
    invariant(format!("event at {coords:?} escaped box {id}"))
}

fn invariant(message: String) -> Error {
    Error::StructuralInvariant(message)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= AGGREGATE_TOLERANCE * (1.0 + a.abs().max(b.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdevents_core::{BoxControllerConfig, EventStore, MdEvent, MemoryEventStore, SplitInto, StoreKey};
    use std::sync::Arc;

    fn controller(threshold: usize) -> BoxController {
        let config = BoxControllerConfig::new()
            .with_split_into(SplitInto::Uniform(2))
            .with_split_threshold(threshold)
            .with_max_depth(4);
        BoxController::new(2, config).unwrap()
    }

    fn unit_square() -> Vec<Extent> {
        vec![Extent::new(0.0, 1.0).unwrap(), Extent::new(0.0, 1.0).unwrap()]
    }

    #[test]
    fn test_child_index_dimension_zero_fastest() {
        let extents = unit_square();
        assert_eq!(child_index(&extents, &[2, 2], &[0.1, 0.1]), Some(0));
        assert_eq!(child_index(&extents, &[2, 2], &[0.9, 0.1]), Some(1));
        assert_eq!(child_index(&extents, &[2, 2], &[0.1, 0.9]), Some(2));
        assert_eq!(child_index(&extents, &[2, 2], &[1.0, 0.9]), None);
        assert_eq!(child_extents(&extents, &[2, 2], 1)[0].min, 0.5);
    }

    #[test]
    fn test_leaf_splits_above_threshold() {
        let controller = controller(3);
        let mut node = BoxNode::leaf(&controller, unit_square(), 0, None, EventBatch::new(2));
        for i in 0..4u8 {
            let x = 0.1 + f32::from(i) * 0.2;
            node.add_event(&controller, MdEvent::unweighted(vec![x, 0.1]).view()).unwrap();
        }
        assert!(!node.is_leaf());
        assert_eq!(node.num_children(), 4);
        assert_eq!(node.n_points(), 4);
        assert_eq!(node.children()[0].n_points(), 2);
        assert_eq!(node.children()[1].n_points(), 2);
        assert!((node.signal() - 4.0).abs() < f64::EPSILON);
        node.validate(&controller).unwrap();
    }

    #[test]
    fn test_release_and_refault() {
        let store = Arc::new(MemoryEventStore::new());
        let controller = controller(100).with_store(store.clone());
        let events: EventBatch = (0..10u8)
            .map(|i| MdEvent::new(vec![f32::from(i) / 10.0, 0.5], f32::from(i), 1.0))
            .collect();
        let node = BoxNode::leaf(&controller, unit_square(), 0, None, events.clone());
        let leaf = node.as_leaf().unwrap();

        assert_eq!(leaf.release(&controller).unwrap(), 10);
        assert!(!leaf.is_resident());
        assert_eq!(store.stored_events(), 10);

        let guard = leaf.acquire(&controller).unwrap();
        assert_eq!(guard.to_sorted_events(), events.to_sorted_events());
        drop(guard);

        // Clean leaves are not rewritten on a second release.
        leaf.release(&controller).unwrap();
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_release_without_store_keeps_events() {
        let controller = controller(100);
        let events: EventBatch = vec![MdEvent::unweighted(vec![0.5, 0.5])].into_iter().collect();
        let node = BoxNode::leaf(&controller, unit_square(), 0, None, events);
        assert_eq!(node.release_all(&controller).unwrap(), 0);
        assert_eq!(node.as_leaf().unwrap().resident_len(), 1);
    }

    #[test]
    fn test_coarsen_merges_small_grid() {
        let controller = controller(100);
        let events: EventBatch = vec![
            MdEvent::unweighted(vec![0.2, 0.2]),
            MdEvent::unweighted(vec![0.7, 0.7]),
        ]
        .into_iter()
        .collect();
        let mut node = BoxNode::leaf(&controller, unit_square(), 0, None, events);
        node.split(&controller).unwrap();
        assert_eq!(node.num_children(), 4);
        assert_eq!(node.coarsen(&controller).unwrap(), 4);
        assert!(node.is_leaf());
        assert_eq!(node.as_leaf().unwrap().resident_len(), 2);
        node.validate(&controller).unwrap();
    }

    /// Store that accepts writes but cannot read anything back.
    #[derive(Default)]
    struct UnreadableStore(MemoryEventStore);

    impl EventStore for UnreadableStore {
        fn save(&self, previous: Option<StoreKey>, events: &EventBatch) -> Result<StoreKey> {
            self.0.save(previous, events)
        }

        fn load(&self, _key: StoreKey, _num_dims: usize) -> Result<EventBatch> {
            Err(Error::store("spill device unavailable"))
        }

        fn free(&self, key: StoreKey) -> Result<()> {
            self.0.free(key)
        }

        fn stored_events(&self) -> usize {
            self.0.stored_events()
        }
    }

    fn one_per_quadrant(signal: f32) -> EventBatch {
        [[0.25, 0.25], [0.75, 0.25], [0.25, 0.75], [0.75, 0.75]]
            .into_iter()
            .map(|coords| MdEvent::new(coords.to_vec(), signal, 1.0))
            .collect()
    }

    #[test]
    fn test_failed_child_insert_keeps_parent_totals() {
        let controller = controller(100).with_store(Arc::new(UnreadableStore::default()));
        let mut node = BoxNode::leaf(&controller, unit_square(), 0, None, one_per_quadrant(1.0));
        node.split(&controller).unwrap();
        assert_eq!(node.children()[2].as_leaf().unwrap().release(&controller).unwrap(), 1);

        assert!(node.add_events(&controller, &one_per_quadrant(2.0)).is_err());
        // Children 0 and 1 took their events before child 2 failed.
        let children: usize = node.children().iter().map(BoxNode::n_points).sum();
        assert_eq!(children, 6);
        assert_eq!(node.n_points(), 6);
        assert!((node.signal() - 8.0).abs() < f64::EPSILON);
        node.validate(&controller).unwrap();
    }
}
