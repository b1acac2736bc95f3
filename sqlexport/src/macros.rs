//! Macros for export error handling.
//!
//! Provides convenience macros for creating and returning
//! [`crate::error::ExportError`] instances with reduced boilerplate.

/// Creates an [`crate::error::ExportError`] from error kind and description.
///
/// Accepts either a static description or a description plus a dynamic
/// detail value.
#[macro_export]
macro_rules! export_error {
    ($kind:expr, $desc:expr) => {
        ExportError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        ExportError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns an [`crate::error::ExportError`] from the current function.
///
/// Combines error creation with early return for error conditions that
/// should immediately terminate execution.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::export_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::export_error!($kind, $desc, $detail))
    };
}
