//! Event and histogram workspaces: a descriptor plus the data it describes.

use crate::tree::BoxTree;
use mdevents_core::{
    BoxControllerConfig, Error, EventBatch, EventStore, MdEvent, MdHistoGrid, Progress, Result,
    WorkspaceDescriptor,
};
use std::sync::Arc;

/// A multidimensional event workspace backed by a box tree.
#[derive(Debug)]
pub struct MdEventWorkspace {
    descriptor: WorkspaceDescriptor,
    tree: BoxTree,
}

impl MdEventWorkspace {
    /// Creates an empty workspace covering the descriptor's ranges.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] for an empty dimension range or
    /// [`Error::Configuration`] for an invalid box configuration.
    pub fn new(descriptor: WorkspaceDescriptor, config: BoxControllerConfig) -> Result<Self> {
        let tree = BoxTree::from_descriptor(&descriptor, config)?;
        Ok(Self { descriptor, tree })
    }

    /// Attaches the store that released leaves spill to.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.tree = self.tree.with_store(store);
        self
    }

    /// Dimension metadata.
    pub fn descriptor(&self) -> &WorkspaceDescriptor {
        &self.descriptor
    }

    /// The box tree.
    pub fn tree(&self) -> &BoxTree {
        &self.tree
    }

    /// Mutable access to the box tree.
    pub fn tree_mut(&mut self) -> &mut BoxTree {
        &mut self.tree
    }

    /// Number of dimensions.
    pub fn num_dims(&self) -> usize {
        self.descriptor.num_dims()
    }

    /// Number of events.
    pub fn n_points(&self) -> usize {
        self.tree.n_points()
    }

    /// Inserts one event; see [`BoxTree::add_event`].
    ///
    /// # Errors
    /// Propagates the insertion error.
    pub fn add_event(&mut self, event: &MdEvent) -> Result<bool> {
        self.tree.add_event(event)
    }

    /// Inserts a batch of events; see [`BoxTree::add_events`].
    ///
    /// # Errors
    /// Propagates the insertion error.
    pub fn add_events(&mut self, events: &EventBatch, progress: &Progress) -> Result<usize> {
        self.tree.add_events(events, progress)
    }
}

/// A multidimensional workspace holding a dense grid.
#[derive(Debug, Clone)]
pub struct MdHistoWorkspace {
    descriptor: WorkspaceDescriptor,
    grid: MdHistoGrid,
}

impl MdHistoWorkspace {
    /// Creates a zeroed grid with `n_bins` cells along each dimension.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if a dimension has no bins.
    pub fn new(descriptor: WorkspaceDescriptor) -> Result<Self> {
        let shape: Vec<usize> = descriptor.dimensions.iter().map(|d| d.n_bins).collect();
        let grid = MdHistoGrid::new(&shape)?;
        Ok(Self { descriptor, grid })
    }

    /// Wraps an existing grid.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when the grid shape disagrees with
    /// the descriptor's bin counts.
    pub fn from_grid(descriptor: WorkspaceDescriptor, grid: MdHistoGrid) -> Result<Self> {
        let matches = grid.num_dims() == descriptor.num_dims()
            && descriptor
                .dimensions
                .iter()
                .zip(grid.shape())
                .all(|(dim, &n)| dim.n_bins == n);
        if !matches {
            return Err(Error::config(format!(
                "grid shape {:?} does not match the descriptor",
                grid.shape()
            )));
        }
        Ok(Self { descriptor, grid })
    }

    /// Dimension metadata.
    pub fn descriptor(&self) -> &WorkspaceDescriptor {
        &self.descriptor
    }

    /// The dense grid.
    pub fn grid(&self) -> &MdHistoGrid {
        &self.grid
    }

    /// Mutable access to the dense grid.
    pub fn grid_mut(&mut self) -> &mut MdHistoGrid {
        &mut self.grid
    }

    /// Number of dimensions.
    pub fn num_dims(&self) -> usize {
        self.descriptor.num_dims()
    }

    /// Number of cells.
    pub fn n_points(&self) -> usize {
        self.grid.len()
    }
}
