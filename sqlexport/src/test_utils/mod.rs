//! Common utilities and helpers for testing table export functionality.
//!
//! This module provides shared testing infrastructure including event
//! collection, pipeline construction helpers and table scripting utilities
//! for the in-memory source.

pub mod event;
pub mod pipeline;
pub mod table;
