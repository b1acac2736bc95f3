//! Source connectors that discover tables and stream their rows.
//!
//! A source decides how a table is read, either in full or as a delta against a
//! change tracking checkpoint, and feeds each materialized row to the export
//! through a shared output buffer.

pub mod base;
pub mod memory;
