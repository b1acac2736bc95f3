use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::concurrency::side_work::SideWorkRegistry;
use crate::error::ExportError;
use crate::types::checkpoint::Checkpoint;
use crate::types::row::OutputRow;
use crate::types::table::{TableId, TableMetadata};

/// A table surfaced by source discovery, paired with its column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredTableInfo {
    pub table_id: TableId,
    pub metadata: TableMetadata,
    /// Per-table progress interval, overrides the configured one when set.
    ///
    /// `Some(0)` disables progress events for this table.
    pub row_event_interval: Option<u64>,
}

/// Identity of one table export within a run.
///
/// Carried by every per-table event so listeners can correlate events without
/// tracking state of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct TableExportContext {
    /// Zero-based position of the table in the run
    pub table_index: usize,
    /// Total number of tables in the run
    pub table_count: usize,
    pub table_id: TableId,
    pub metadata: TableMetadata,
}

/// The checkpoint read at the start of a table export next to the stored one.
///
/// `current` is the checkpoint the source reported when the export began, `previous`
/// is the validated checkpoint loaded from the store. Either can be absent: a table
/// without change tracking reports no current checkpoint, and a first export or an
/// invalidated baseline has no previous one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CheckpointPair {
    pub current: Option<Checkpoint>,
    pub previous: Option<Checkpoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlExecutionStartedEvent {
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlExecutionEndedEvent {
    pub sql: String,
}

/// Fired once per run after table discovery, before any table export begins.
///
/// Listeners may register work on `side_work`, the run waits for it before starting
/// the first table.
#[derive(Debug, Clone)]
pub struct DataTablesDiscoveredEvent {
    pub tables: Vec<DiscoveredTableInfo>,
    pub side_work: SideWorkRegistry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableExportStartEvent {
    pub context: TableExportContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableChangeTrackVersionSeenEvent {
    pub context: TableExportContext,
    pub checkpoints: CheckpointPair,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableExportProgressEvent {
    pub context: TableExportContext,
    pub checkpoints: CheckpointPair,
    /// Number of rows forwarded to the sink so far
    pub current_row_index: u64,
}

/// Fired for a row that failed shape validation and was kept away from the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidRowSeenEvent {
    pub context: TableExportContext,
    pub checkpoints: CheckpointPair,
    pub current_row_index: u64,
    /// Snapshot of the output buffer at the time the row was rejected
    pub row: OutputRow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeTrackingVersionUploadedEvent {
    pub context: TableExportContext,
    pub previous: Option<Checkpoint>,
    /// The checkpoint that was persisted
    pub version: Checkpoint,
}

#[derive(Debug, Clone)]
pub struct TableExportEndEvent {
    pub context: TableExportContext,
    pub checkpoints: CheckpointPair,
    pub rows_processed_total: u64,
    pub duration: Duration,
    /// Errors captured during the export, empty on success
    pub errors: Vec<Arc<ExportError>>,
}

impl TableExportEndEvent {
    /// Returns whether the table export completed without captured errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// An event fired by the export engine.
///
/// Per table, events fire in the order start, checkpoint-seen, zero or more
/// progress/invalid-row, end, and on success an optional checkpoint-uploaded. Across
/// tables the ordering is strict: table N's end always precedes table N+1's start.
#[derive(Debug, Clone)]
pub enum ExportEvent {
    SqlExecutionStarted(SqlExecutionStartedEvent),
    SqlExecutionEnded(SqlExecutionEndedEvent),
    DataTablesDiscovered(DataTablesDiscoveredEvent),
    TableExportStart(TableExportStartEvent),
    TableChangeTrackVersionSeen(TableChangeTrackVersionSeenEvent),
    TableExportProgress(TableExportProgressEvent),
    InvalidRowSeen(InvalidRowSeenEvent),
    ChangeTrackingVersionUploaded(ChangeTrackingVersionUploadedEvent),
    TableExportEnd(TableExportEndEvent),
}

impl ExportEvent {
    /// Returns the [`EventType`] that corresponds to this event.
    pub fn event_type(&self) -> EventType {
        self.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    SqlExecutionStarted,
    SqlExecutionEnded,
    DataTablesDiscovered,
    TableExportStart,
    TableChangeTrackVersionSeen,
    TableExportProgress,
    InvalidRowSeen,
    ChangeTrackingVersionUploaded,
    TableExportEnd,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SqlExecutionStarted => write!(f, "SqlExecutionStarted"),
            Self::SqlExecutionEnded => write!(f, "SqlExecutionEnded"),
            Self::DataTablesDiscovered => write!(f, "DataTablesDiscovered"),
            Self::TableExportStart => write!(f, "TableExportStart"),
            Self::TableChangeTrackVersionSeen => write!(f, "TableChangeTrackVersionSeen"),
            Self::TableExportProgress => write!(f, "TableExportProgress"),
            Self::InvalidRowSeen => write!(f, "InvalidRowSeen"),
            Self::ChangeTrackingVersionUploaded => write!(f, "ChangeTrackingVersionUploaded"),
            Self::TableExportEnd => write!(f, "TableExportEnd"),
        }
    }
}

impl From<&ExportEvent> for EventType {
    fn from(event: &ExportEvent) -> Self {
        match event {
            ExportEvent::SqlExecutionStarted(_) => EventType::SqlExecutionStarted,
            ExportEvent::SqlExecutionEnded(_) => EventType::SqlExecutionEnded,
            ExportEvent::DataTablesDiscovered(_) => EventType::DataTablesDiscovered,
            ExportEvent::TableExportStart(_) => EventType::TableExportStart,
            ExportEvent::TableChangeTrackVersionSeen(_) => EventType::TableChangeTrackVersionSeen,
            ExportEvent::TableExportProgress(_) => EventType::TableExportProgress,
            ExportEvent::InvalidRowSeen(_) => EventType::InvalidRowSeen,
            ExportEvent::ChangeTrackingVersionUploaded(_) => {
                EventType::ChangeTrackingVersionUploaded
            }
            ExportEvent::TableExportEnd(_) => EventType::TableExportEnd,
        }
    }
}

impl From<ExportEvent> for EventType {
    fn from(event: ExportEvent) -> Self {
        (&event).into()
    }
}
