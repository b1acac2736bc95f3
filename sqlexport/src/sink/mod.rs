//! Sinks that receive finalized output rows.
//!
//! A sink is created lazily for the first valid row of a table export and
//! receives every following row synchronously. Longer running upload work is
//! handed back as background handles which the export joins before reporting
//! the table as done.

pub mod base;
pub mod memory;
