//! Event publication for export observability.
//!
//! The engine reports progress through a typed in-process event bus. Consumers
//! register listeners per event type or for the whole catalog; the bundled logging
//! listener forwards every event to `tracing`.

pub mod bus;
pub mod logging;
