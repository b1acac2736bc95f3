use tracing::{debug, error, info, warn};

use crate::events::bus::EventBus;
use crate::types::{Checkpoint, ExportEvent};

/// Subscribes a listener that forwards every export event to `tracing`.
///
/// Table lifecycle and checkpoint events are logged at info, per-query and progress
/// events at debug, invalid rows at warn, and failed table exports at error.
pub fn install_tracing_listener(bus: &EventBus) {
    bus.on_any(log_event);
}

fn log_event(event: &ExportEvent) {
    match event {
        ExportEvent::SqlExecutionStarted(event) => {
            debug!("sql execution started: {}", event.sql);
        }
        ExportEvent::SqlExecutionEnded(event) => {
            debug!("sql execution ended: {}", event.sql);
        }
        ExportEvent::DataTablesDiscovered(event) => {
            info!("discovered {} tables to export", event.tables.len());
        }
        ExportEvent::TableExportStart(event) => {
            info!(
                "starting export for table {} ({} of {})",
                event.context.table_id,
                event.context.table_index + 1,
                event.context.table_count
            );
        }
        ExportEvent::TableChangeTrackVersionSeen(event) => {
            info!(
                "change tracking info for table {}: previous version {}, enabled {}, current version {}",
                event.context.table_id,
                describe_checkpoint(&event.checkpoints.previous),
                event.context.metadata.change_tracking_enabled,
                describe_checkpoint(&event.checkpoints.current)
            );
        }
        ExportEvent::TableExportProgress(event) => {
            debug!(
                "processed {} rows for table {}",
                event.current_row_index, event.context.table_id
            );
        }
        ExportEvent::InvalidRowSeen(event) => {
            warn!(
                "invalid row at index {} for table {}",
                event.current_row_index, event.context.table_id
            );
        }
        ExportEvent::ChangeTrackingVersionUploaded(event) => {
            info!(
                "change tracking version {} uploaded for table {}",
                event.version, event.context.table_id
            );
        }
        ExportEvent::TableExportEnd(event) => {
            if event.is_success() {
                info!(
                    "export for table {} ended successfully, {} rows in {:?}",
                    event.context.table_id, event.rows_processed_total, event.duration
                );
            } else {
                error!(
                    "export for table {} ended with {} errors, {} rows in {:?}",
                    event.context.table_id,
                    event.errors.len(),
                    event.rows_processed_total,
                    event.duration
                );
            }
        }
    }
}

fn describe_checkpoint(checkpoint: &Option<Checkpoint>) -> String {
    match checkpoint {
        Some(checkpoint) => checkpoint.to_string(),
        None => "none".to_string(),
    }
}
