use serde::{Deserialize, Serialize};

/// Tuning knobs for a table-export run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Number of rows between two progress events for a single table.
    ///
    /// `0` disables progress events. A table can override this through the
    /// `row_event_interval` on its discovery record.
    pub row_event_interval: u64,
    /// Whether change tracking is enabled on a source table as a side effect
    /// of checking checkpoint validity when it is not enabled yet.
    ///
    /// When `false`, tables without change tracking are exported with a full
    /// read on every run and no checkpoint is ever written for them.
    pub auto_enable_change_tracking: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            row_event_interval: 0,
            auto_enable_change_tracking: true,
        }
    }
}
