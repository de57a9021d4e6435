//! mdevents-algorithms: The adaptive box tree and the algorithms built on it.
//!
//! - **Box tree** - recursive N-dimensional subdivision driven by a split threshold
//! - **Workspaces** - event and histogram workspaces carrying a descriptor
//! - **Comparison** - structural equality of two workspaces within a tolerance
//! - **Conversion** - detector events to momentum/energy coordinates
//! - **Binning** - event tree to regular histogram grid
//!
#![warn(missing_docs)]

mod bin;
mod compare;
mod controller;
mod convert;
mod node;
mod tree;
mod workspace;

pub use bin::{bin_tree, bin_workspace};
pub use compare::{
    compare_workspaces, compare_workspaces_with_progress, exceeds_tolerance, CompareOptions,
    CompareOutcome, MdWorkspaceRef, EVENT_TOLERANCE, SUCCESS,
};
pub use controller::{BoxController, BoxId};
pub use convert::{
    convert_to_md, energy_from_k, k_from_energy, AnalysisMode, ConversionInput, ConversionPlan,
    ConversionRegistry, ConversionStrategy, ConversionSummary, ConversionTags, DetectorSpectrum,
    ModQConversion, NoQConversion, Q3DConversion, QMode, RawEvent, UnitConversion,
    ENERGY_PER_K2, K_PER_VELOCITY,
};
pub use node::{BoxContent, BoxNode, EventsGuard, LeafBox};
pub use tree::BoxTree;
pub use workspace::{MdEventWorkspace, MdHistoWorkspace};
