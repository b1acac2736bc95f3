//! Streamed query execution with progress events.
//!
//! Wraps a [`crate::connection::base::SqlConnection`] so that every query is
//! bracketed by execution events and finalized unconditionally, and layers the
//! common query shapes on top of row streaming.

pub mod executor;
