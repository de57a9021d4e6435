//! mdevents-io: File I/O and out-of-core storage for mdevents.
//!
//! This crate provides memory-mapped event-file reading via memmap2, CSV
//! and binary writers, and a spill-file [`FileEventStore`] that lets box
//! trees release leaf events out of memory.
//!

mod error;
pub mod out_of_core;
mod reader;
mod writer;

pub use error::{Error, Result};
pub use out_of_core::{enforce_memory_budget, FileEventStore, OutOfCoreConfig};
pub use reader::{read_events_csv, EventFileHeader, EventFileReader, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use writer::EventFileWriter;
