pub mod concurrency;
pub mod connection;
pub mod error;
pub mod events;
pub mod export;
mod macros;
pub mod pipeline;
pub mod query;
pub mod reconcile;
pub mod sink;
pub mod source;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
