//! Lock-step comparison of two multidimensional workspaces.
//!
//! The comparison is fail-fast: the first structural or numerical
//! divergence ends it and becomes the outcome's message. The one exception
//! is the event-level check of a leaf pair, which logs every mismatching
//! event before failing. Nothing here returns an error; every failure,
//! including an event store that cannot be read, is reported through
//! [`CompareOutcome`].

use crate::node::{BoxNode, LeafBox};
use crate::tree::BoxTree;
use crate::workspace::{MdEventWorkspace, MdHistoWorkspace};
use mdevents_core::{MdEvent, MdHistoGrid, Progress, WorkspaceDescriptor};
use std::fmt::Display;
use thiserror::Error;

/// Fixed tolerance for event-by-event comparison.
pub const EVENT_TOLERANCE: f64 = 1e-5;

/// Message of a successful comparison.
pub const SUCCESS: &str = "Success!";

/// Comparison settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct CompareOptions {
    /// Maximum difference between compared values.
    pub tolerance: f64,
    /// Compare event counts and individual events of leaf boxes.
    pub check_events: bool,
    /// Skip box-id checks; ids are run-local under parallel splitting.
    pub ignore_box_id: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.0,
            check_events: true,
            ignore_box_id: true,
        }
    }
}

impl CompareOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Enables or disables event comparison.
    #[must_use]
    pub fn with_check_events(mut self, check_events: bool) -> Self {
        self.check_events = check_events;
        self
    }

    /// Enables or disables box-id comparison.
    #[must_use]
    pub fn with_ignore_box_id(mut self, ignore_box_id: bool) -> Self {
        self.ignore_box_id = ignore_box_id;
        self
    }
}

/// Result of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareOutcome {
    /// True when no divergence was found.
    pub equals: bool,
    /// [`SUCCESS`], or a description of the divergence.
    pub message: String,
}

/// Either kind of workspace the comparator accepts.
#[derive(Debug, Clone, Copy)]
pub enum MdWorkspaceRef<'a> {
    /// An event workspace.
    Event(&'a MdEventWorkspace),
    /// A histogram workspace.
    Histo(&'a MdHistoWorkspace),
}

impl MdWorkspaceRef<'_> {
    fn type_name(&self) -> String {
        match self {
            Self::Event(ws) => format!("MDEventWorkspace<{}>", ws.num_dims()),
            Self::Histo(_) => "MDHistoWorkspace".to_string(),
        }
    }

    fn descriptor(&self) -> &WorkspaceDescriptor {
        match self {
            Self::Event(ws) => ws.descriptor(),
            Self::Histo(ws) => ws.descriptor(),
        }
    }
}

impl<'a> From<&'a MdEventWorkspace> for MdWorkspaceRef<'a> {
    fn from(ws: &'a MdEventWorkspace) -> Self {
        Self::Event(ws)
    }
}

impl<'a> From<&'a MdHistoWorkspace> for MdWorkspaceRef<'a> {
    fn from(ws: &'a MdHistoWorkspace) -> Self {
        Self::Histo(ws)
    }
}

/// The first divergence found; converted into a [`CompareOutcome`].
#[derive(Debug, Error)]
#[error("{0}")]
struct ComparisonFailure(String);

type Check = std::result::Result<(), ComparisonFailure>;

fn versus<T: Display>(a: T, b: T) -> String {
    format!("({a} vs {b})")
}

fn fail<T: Display>(message: &str, a: T, b: T) -> ComparisonFailure {
    ComparisonFailure(format!("{message} {}", versus(a, b)))
}

fn exact<T: PartialEq + Display>(a: T, b: T, message: &str) -> Check {
    if a == b {
        Ok(())
    } else {
        Err(fail(message, a, b))
    }
}

/// Whether `a` and `b` differ by more than `tolerance`.
///
/// The absolute difference is tested unless both magnitudes exceed
/// `2 * tolerance`; then the relative difference `0.5 * |a-b| / (|a|+|b|)`
/// is tested instead.
pub fn exceeds_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
    let diff = (a - b).abs();
    if diff <= tolerance {
        return false;
    }
    let (pa, pb) = (a.abs(), b.abs());
    if pa > 2.0 * tolerance && pb > 2.0 * tolerance {
        0.5 * diff / (pa + pb) > tolerance
    } else {
        true
    }
}

/// Compares two workspaces with a silent progress tracker.
pub fn compare_workspaces<'a>(
    a: impl Into<MdWorkspaceRef<'a>>,
    b: impl Into<MdWorkspaceRef<'a>>,
    options: &CompareOptions,
) -> CompareOutcome {
    compare_workspaces_with_progress(a, b, options, &Progress::silent())
}

/// Compares two workspaces, advancing `progress` once per box pair.
///
/// Cancellation ends the comparison with `equals = false`.
pub fn compare_workspaces_with_progress<'a>(
    a: impl Into<MdWorkspaceRef<'a>>,
    b: impl Into<MdWorkspaceRef<'a>>,
    options: &CompareOptions,
    progress: &Progress,
) -> CompareOutcome {
    let comparator = Comparator { options, progress };
    match comparator.run(a.into(), b.into()) {
        Ok(()) => CompareOutcome {
            equals: true,
            message: SUCCESS.to_string(),
        },
        Err(failure) => {
            log::info!("The workspaces did not match: {failure}");
            CompareOutcome {
                equals: false,
                message: failure.0,
            }
        }
    }
}

struct Comparator<'a> {
    options: &'a CompareOptions,
    progress: &'a Progress,
}

impl Comparator<'_> {
    fn within(&self, a: f64, b: f64, message: &str) -> Check {
        if exceeds_tolerance(a, b, self.options.tolerance) {
            Err(fail(message, a, b))
        } else {
            Ok(())
        }
    }

    fn run(&self, a: MdWorkspaceRef<'_>, b: MdWorkspaceRef<'_>) -> Check {
        exact(a.type_name(), b.type_name(), "Workspaces are of different types")?;
        self.compare_geometry(a.descriptor(), b.descriptor())?;
        match (a, b) {
            (MdWorkspaceRef::Histo(h1), MdWorkspaceRef::Histo(h2)) => self.compare_histo(h1.grid(), h2.grid()),
            (MdWorkspaceRef::Event(e1), MdWorkspaceRef::Event(e2)) => self.compare_trees(e1.tree(), e2.tree()),
            _ => Err(ComparisonFailure("Workspaces are of different types.".to_string())),
        }
    }

    fn compare_geometry(&self, d1: &WorkspaceDescriptor, d2: &WorkspaceDescriptor) -> Check {
        exact(
            d1.num_dims(),
            d2.num_dims(),
            "Workspaces have a different number of dimensions",
        )?;
        for (d, (dim1, dim2)) in d1.dimensions.iter().zip(&d2.dimensions).enumerate() {
            exact(&dim1.name, &dim2.name, &format!("Dimension #{d} has a different name"))?;
            exact(&dim1.units, &dim2.units, &format!("Dimension #{d} has different units"))?;
            exact(
                dim1.n_bins,
                dim2.n_bins,
                &format!("Dimension #{d} has a different number of bins"),
            )?;
            self.within(dim1.min, dim2.min, &format!("Dimension #{d} has a different minimum"))?;
            self.within(dim1.max, dim2.max, &format!("Dimension #{d} has a different maximum"))?;
        }
        Ok(())
    }

    /// Plain absolute comparison, cell by cell.
    fn compare_histo(&self, g1: &MdHistoGrid, g2: &MdHistoGrid) -> Check {
        exact(g1.num_dims(), g2.num_dims(), "Workspaces have a different number of dimensions")?;
        exact(g1.len(), g2.len(), "Workspaces have a different number of points")?;
        let tolerance = self.options.tolerance;
        for i in 0..g1.len() {
            let (s1, s2) = (g1.signal_at(i).unwrap_or_default(), g2.signal_at(i).unwrap_or_default());
            if (s1 - s2).abs() > tolerance {
                return Err(fail(
                    &format!("MDHistoWorkspaces have a different signal at index {i}"),
                    s1,
                    s2,
                ));
            }
            let (e1, e2) = (g1.error_at(i).unwrap_or_default(), g2.error_at(i).unwrap_or_default());
            if (e1 - e2).abs() > tolerance {
                return Err(fail(
                    &format!("MDHistoWorkspaces have a different error at index {i}"),
                    e1,
                    e2,
                ));
            }
        }
        Ok(())
    }

    fn compare_trees(&self, t1: &BoxTree, t2: &BoxTree) -> Check {
        let boxes1 = t1.boxes();
        let boxes2 = t2.boxes();
        exact(
            boxes1.len(),
            boxes2.len(),
            "Workspaces do not have the same number of boxes",
        )?;

        for (j, (box1, box2)) in boxes1.iter().zip(&boxes2).enumerate() {
            self.progress
                .advance(1)
                .map_err(|_| ComparisonFailure("Comparison was cancelled".to_string()))?;
            self.compare_box(j, box1, box2, t1, t2)?;
        }
        Ok(())
    }

    fn compare_box(&self, j: usize, box1: &BoxNode, box2: &BoxNode, t1: &BoxTree, t2: &BoxTree) -> Check {
        if self.options.ignore_box_id {
            if box1.id() != box2.id() {
                log::debug!(
                    "Boxes N: {j} have box ID: {} and {} correspondingly",
                    box1.id(),
                    box2.id()
                );
            }
        } else {
            exact(box1.id(), box2.id(), "Boxes have different ID")?;
        }
        exact(box1.depth(), box2.depth(), "Boxes are at a different depth")?;
        exact(
            box1.num_children(),
            box2.num_children(),
            "Boxes do not have the same number of children",
        )?;
        if !self.options.ignore_box_id {
            for (c1, c2) in box1.children().iter().zip(box2.children()) {
                exact(c1.id(), c2.id(), "Child of boxes do not match IDs")?;
            }
        }

        for (e1, e2) in box1.extents().iter().zip(box2.extents()) {
            self.within(e1.min, e2.min, "Extents of box do not match")?;
            self.within(e1.max, e2.max, "Extents of box do not match")?;
        }
        self.within(
            box1.inverse_volume(),
            box2.inverse_volume(),
            "Box inverse volume does not match",
        )?;
        self.within(box1.signal(), box2.signal(), "Box signal does not match")?;
        self.within(
            box1.error_squared(),
            box2.error_squared(),
            "Box error squared does not match",
        )?;
        if self.options.check_events {
            exact(
                box1.n_points(),
                box2.n_points(),
                "Number of points in box does not match",
            )?;
        }

        match (box1.as_leaf(), box2.as_leaf()) {
            (None, None) => {
                let splits1 = t1.controller().split_into();
                let splits2 = t2.controller().split_into();
                for ((e1, &n1), (e2, &n2)) in box1
                    .extents()
                    .iter()
                    .zip(splits1)
                    .zip(box2.extents().iter().zip(splits2))
                {
                    self.within(box_size(e1.width(), n1), box_size(e2.width(), n2), "Box sizes do not match")?;
                }
                Ok(())
            }
            (Some(leaf1), Some(leaf2)) if self.options.check_events => {
                compare_leaf_events(j, leaf1, t1, leaf2, t2)
            }
            (Some(_), Some(_)) => Ok(()),
            _ => {
                log::error!("Box {j}, MDEvent box 1 and/or box2 are NULL");
                Ok(())
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn box_size(width: f64, parts: usize) -> f64 {
    width / parts as f64
}

/// Compares the events of two leaves, then releases both leaves whatever
/// the outcome.
fn compare_leaf_events(j: usize, leaf1: &LeafBox, t1: &BoxTree, leaf2: &LeafBox, t2: &BoxTree) -> Check {
    let result = if std::ptr::eq(leaf1, leaf2) {
        Ok(())
    } else {
        sorted_events(leaf1, t1).and_then(|events1| {
            sorted_events(leaf2, t2).and_then(|events2| compare_sorted_events(j, &events1, &events2))
        })
    };

    let released = leaf1
        .release(t1.controller())
        .and_then(|_| leaf2.release(t2.controller()));
    match (result, released) {
        (Err(failure), _) => Err(failure),
        (Ok(()), Err(err)) => Err(ComparisonFailure(format!("Box {j} events could not be released: {err}"))),
        (Ok(()), Ok(_)) => Ok(()),
    }
}

/// Faults a leaf in and copies its events out in sorted order.
fn sorted_events(leaf: &LeafBox, tree: &BoxTree) -> std::result::Result<Vec<MdEvent>, ComparisonFailure> {
    leaf.acquire(tree.controller())
        .map(|events| events.to_sorted_events())
        .map_err(|err| ComparisonFailure(format!("Box events could not be loaded: {err}")))
}

fn compare_sorted_events(j: usize, events1: &[MdEvent], events2: &[MdEvent]) -> Check {
    exact(
        events1.len(),
        events2.len(),
        "Box event vectors are not the same length",
    )?;
    if events1.len() <= 2 {
        return Ok(());
    }

    let mut same = true;
    for (i, (e1, e2)) in events1.iter().zip(events2).enumerate() {
        let coords_differ = e1
            .coords()
            .iter()
            .zip(e2.coords())
            .any(|(&a, &b)| exceeds_tolerance(f64::from(a), f64::from(b), EVENT_TOLERANCE));
        let signal_differs = exceeds_tolerance(
            f64::from(e1.signal()),
            f64::from(e2.signal()),
            EVENT_TOLERANCE,
        );
        let error_differs = exceeds_tolerance(
            f64::from(e1.error_squared()),
            f64::from(e2.error_squared()),
            EVENT_TOLERANCE,
        );
        if coords_differ || signal_differs || error_differs {
            log::error!(
                "Box {j} event {i} signal difference = {}",
                (e1.signal() - e2.signal()).abs()
            );
            log::error!("Box {j} Event {i}  :  {e1} ... {e2}");
            same = false;
        }
    }
    if same {
        Ok(())
    } else {
        Err(ComparisonFailure("MDEvents are not the same".to_string()))
    }
}
