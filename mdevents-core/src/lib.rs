//! mdevents-core: Core types for multidimensional event workspaces.
//!
//! This crate provides the event record and its columnar batch storage,
//! box extents, box-controller configuration, workspace descriptors, the
//! time-ROI interval algebra and the event-store abstraction used by
//! out-of-core box trees.
//!

pub mod config;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod extents;
pub mod histo;
pub mod progress;
pub mod soa;
pub mod store;
pub mod time_roi;
pub mod time_splitter;

pub use config::{BoxControllerConfig, OutOfBoundsPolicy, SplitInto};
pub use descriptor::{apply_rotation, make_axis_name, Dimension, WorkspaceDescriptor};
pub use error::{Error, Result};
pub use event::{EventRef, MdEvent};
pub use extents::{check_contains, volume, Extent};
pub use histo::MdHistoGrid;
pub use progress::{CancellationToken, Progress};
pub use soa::EventBatch;
pub use store::{EventStore, MemoryEventStore, StoreKey};
pub use time_roi::{DateAndTime, TimeRoi, ROI_IGNORE, ROI_USE};
pub use time_splitter::TimeSplitter;
