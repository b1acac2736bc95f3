//! Checkpoint persistence between export runs.
//!
//! A checkpoint store holds the last change tracking version exported per table.
//! Stored values are kept raw so that the source connector decides what counts as
//! a usable checkpoint when the next run reads them back.

pub mod base;
pub mod memory;
