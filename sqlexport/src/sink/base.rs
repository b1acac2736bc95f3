use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::concurrency::flow::FlowHandle;
use crate::error::ExportResult;
use crate::types::{OutputRow, TableId, TableMetadata, BOOKKEEPING_COLUMN_COUNT};

/// Everything a sink factory gets to know about the table it creates a sink for.
pub struct SinkRequest<'a> {
    pub table_id: &'a TableId,
    pub metadata: &'a TableMetadata,
    /// Names of the bookkeeping columns appended after the source columns
    pub additional_columns: [&'static str; BOOKKEEPING_COLUMN_COUNT],
    /// The wall clock time the table export started processing
    pub started_at: DateTime<Utc>,
}

/// What the export should do with the sink after a processed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkAction {
    /// Keep feeding rows to this sink.
    Continue,
    /// Finalize this sink now; the next valid row gets a freshly created one.
    Reset,
}

/// A sink created by a [`SinkFactory`], together with its background work.
///
/// The export joins `completion` after streaming finished, so upload failures
/// surface in the table's error list even when every row was accepted.
#[derive(Debug)]
pub struct CreatedSink<S> {
    pub sink: S,
    pub completion: Vec<JoinHandle<ExportResult<()>>>,
}

/// This trait represents a destination receiving one table's finalized rows.
///
/// Rows arrive synchronously from the streaming loop, so implementations must
/// not block; long running work belongs in the completion handles returned at
/// creation. A sink asking for [`SinkAction::Reset`] is finalized immediately
/// and replaced on the next valid row, which lets destinations cap how much a
/// single sink instance accepts.
pub trait RowSink: Send {
    /// Accepts one finalized row, including its bookkeeping columns.
    fn process(&mut self, row: &OutputRow, flow: Option<&FlowHandle>) -> ExportResult<SinkAction>;

    /// Signals that no more rows will arrive for this sink instance.
    fn end(&mut self);
}

/// This trait represents a factory creating one [`RowSink`] per table export,
/// lazily on the first valid row.
///
/// A table export that streams no valid rows never creates a sink, so empty
/// delta runs do not produce empty destination artifacts.
pub trait SinkFactory: Send + Sync {
    type Sink: RowSink;

    fn create_sink(&self, request: SinkRequest<'_>) -> ExportResult<CreatedSink<Self::Sink>>;
}
