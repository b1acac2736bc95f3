mod base;
mod connection;
mod export;
mod pipeline;

pub use base::*;
pub use connection::*;
pub use export::*;
pub use pipeline::*;
