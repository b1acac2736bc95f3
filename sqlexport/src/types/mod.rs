//! Common types used throughout the export engine.
//!
//! Re-exports table identifiers and metadata, row values, change tracking
//! checkpoints, and the export event catalog used across the pipeline.

mod checkpoint;
mod event;
mod pipeline;
mod row;
mod table;

pub use checkpoint::*;
pub use event::*;
pub use pipeline::*;
pub use row::*;
pub use table::*;
