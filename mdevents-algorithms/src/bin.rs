//! Binning of box-tree events onto dense grids.

use crate::tree::BoxTree;
use crate::workspace::{MdEventWorkspace, MdHistoWorkspace};
use mdevents_core::{Error, MdHistoGrid, Result, WorkspaceDescriptor};

/// Bins every event of `tree` using each dimension's range and bin count.
///
/// Events outside the descriptor ranges are skipped. Released leaves are
/// faulted in one at a time and released again.
///
/// # Errors
/// Returns [`Error::DimensionMismatch`] if the descriptor and the tree
/// disagree on the dimensionality, or a store error.
pub fn bin_tree(tree: &BoxTree, descriptor: &WorkspaceDescriptor) -> Result<MdHistoGrid> {
    if descriptor.num_dims() != tree.num_dims() {
        return Err(Error::DimensionMismatch {
            expected: tree.num_dims(),
            actual: descriptor.num_dims(),
        });
    }
    let extents = descriptor.extents()?;
    let n_bins: Vec<usize> = descriptor.dimensions.iter().map(|d| d.n_bins).collect();
    let mut grid = MdHistoGrid::new(&n_bins)?;
    let mut index = vec![0usize; n_bins.len()];
    let mut skipped = 0usize;

    tree.for_each_leaf(|_, events| {
        'events: for event in events.iter() {
            for (d, (&c, extent)) in event.coords.iter().zip(&extents).enumerate() {
                match extent.sub_index(f64::from(c), n_bins[d]) {
                    Some(bin) => index[d] = bin,
                    None => {
                        skipped += 1;
                        continue 'events;
                    }
                }
            }
            grid.add_at(&index, f64::from(event.signal), f64::from(event.error_sq))?;
        }
        Ok(())
    })?;

    if skipped > 0 {
        log::debug!("{skipped} events fell outside the histogram ranges");
    }
    Ok(grid)
}

/// Bins an event workspace into a histogram workspace with the same descriptor.
///
/// # Errors
/// See [`bin_tree`].
pub fn bin_workspace(workspace: &MdEventWorkspace) -> Result<MdHistoWorkspace> {
    let grid = bin_tree(workspace.tree(), workspace.descriptor())?;
    MdHistoWorkspace::from_grid(workspace.descriptor().clone(), grid)
}
