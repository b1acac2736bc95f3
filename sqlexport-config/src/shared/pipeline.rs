use serde::{Deserialize, Serialize};

use crate::shared::{ExportConfig, SqlConnectionConfig, ValidationError};

/// Configuration for one export pipeline.
///
/// Contains all settings required to run a multi-table export: source
/// connection settings and export tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The unique identifier for this pipeline.
    ///
    /// A pipeline id isolates pipelines from each other in terms of
    /// checkpoint storage.
    pub id: u64,
    /// The connection configuration for the source server.
    pub connection: SqlConnectionConfig,
    /// Export tuning settings.
    #[serde(default)]
    pub export: ExportConfig,
}

impl PipelineConfig {
    /// Validates pipeline configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.connection.host.is_empty() {
            return Err(ValidationError::EmptyHost);
        }

        if self.connection.port == 0 {
            return Err(ValidationError::ZeroPort);
        }

        Ok(())
    }
}
