//! Connection pooling and streamed query execution against a source database.
//!
//! The pool hands out one connection at a time under scoped acquisition, so release
//! happens on every exit path. Connections deliver query results row by row through
//! a caller supplied callback, capturing driver failures as values so callers can
//! always finalize before surfacing them.

pub mod base;
pub mod memory;
