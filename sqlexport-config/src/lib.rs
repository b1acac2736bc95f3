//! Configuration management for table-export applications.
//!
//! Provides environment detection, configuration loading from YAML files with
//! environment variable overrides, secret handling, and the shared
//! configuration types consumed by the export engine.

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::*;
pub use load::*;
pub use secret::*;
