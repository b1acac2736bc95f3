//! Tracing bootstrap for table-export applications.
//!
//! Initializes the `tracing` subscriber stack: pretty console output during
//! development, daily-rolling JSON files in production, a bridge for `log`
//! records, and a panic hook that routes panics through `tracing`.

pub mod tracing;

pub use crate::tracing::*;
