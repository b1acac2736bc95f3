use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque change tracking checkpoint for a single table.
///
/// The engine treats checkpoints as structured but schemaless data. Connectors decide
/// what a checkpoint contains (a version number, an LSN string, a composite cursor)
/// and whether a stored value is still usable. Equality is structural, so two
/// checkpoints compare equal exactly when their serialized forms are identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint(pub serde_json::Value);

impl Checkpoint {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }

    /// Returns the checkpoint as a signed integer when it holds one.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.as_i64()
    }
}

impl From<serde_json::Value> for Checkpoint {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<i64> for Checkpoint {
    fn from(version: i64) -> Self {
        Self(serde_json::Value::from(version))
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
