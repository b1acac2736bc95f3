//! Concurrency primitives used by the export engine.
//!
//! Contains the reference counted flow control handle shared between row handlers and
//! source drivers, and the registry of background tasks an export run must await
//! before it can report completion.

pub mod flow;
pub mod side_work;
