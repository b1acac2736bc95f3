//! The per table export state machine.
//!
//! Runs one table end to end: reconciles the stored checkpoint, streams rows
//! through the bookkeeping stamp into a lazily created sink, joins background
//! sink work and persists the checkpoint the run observed.

pub mod table;
