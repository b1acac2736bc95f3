use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The source connection host must be set.
    #[error("`connection.host` cannot be empty")]
    EmptyHost,
    /// The source connection port must be non-zero.
    #[error("`connection.port` cannot be zero")]
    ZeroPort,
}
