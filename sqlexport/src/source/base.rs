use std::future::Future;

use chrono::{DateTime, Utc};

use crate::concurrency::flow::FlowHandle;
use crate::connection::base::SqlConnection;
use crate::error::ExportResult;
use crate::query::executor::QueryExecutor;
use crate::types::{Checkpoint, DiscoveredTableInfo, OutputRow, RowStatus, TableId, TableMetadata};

/// Callback receiving each materialized row during table streaming.
///
/// The source fills the shared output buffer with the row's source columns
/// before invoking it. The callback stamps the bookkeeping columns, forwards
/// the row downstream and may return an error to stop the stream.
pub type SourceRowFn<'a> = &'a mut (dyn FnMut(
    &mut OutputRow,
    RowStatus,
    Option<DateTime<Utc>>,
    Option<&FlowHandle>,
) -> ExportResult<()>
             + Send);

/// Callback invoked once the streaming query for a table has finished,
/// regardless of whether it succeeded.
pub type QueryEndFn<'a> = &'a mut (dyn FnMut() + Send);

/// Everything a source needs to stream one table.
///
/// `output` is the reusable row buffer, sized for the table's source columns
/// plus the bookkeeping columns. The source writes source column values into
/// it and hands it to `on_row` once per row.
pub struct TableStream<'a, C> {
    pub executor: &'a QueryExecutor,
    pub connection: &'a mut C,
    pub table_id: &'a TableId,
    pub metadata: &'a TableMetadata,
    pub output: &'a mut OutputRow,
    pub on_row: SourceRowFn<'a>,
    pub on_query_end: QueryEndFn<'a>,
}

/// This trait represents a source database that tables are exported from.
///
/// A source knows how to discover the tables to export, how to read a table in
/// full and, when it supports change tracking, how to read only the rows that
/// changed since a checkpoint.
pub trait TableSource: Send + Sync {
    type Connection: SqlConnection;

    /// Discovers the tables this source exports, together with their metadata.
    fn discover_tables(
        &self,
        executor: &QueryExecutor,
        connection: &mut Self::Connection,
    ) -> impl Future<Output = ExportResult<Vec<DiscoveredTableInfo>>> + Send;

    /// Returns whether this source can resume from checkpoints via delta reads.
    ///
    /// Sources answering `false` are always read in full and never touch the
    /// checkpoint store.
    fn supports_change_tracking(&self) -> bool;

    /// Decodes a raw stored value into a checkpoint.
    ///
    /// Returns [`None`] when the value does not have a shape this source can
    /// resume from, which downgrades the run to a full read.
    fn validate_checkpoint(&self, raw: &serde_json::Value) -> Option<Checkpoint>;

    /// Establishes which checkpoint, if any, the next read may resume from.
    ///
    /// `previous` is the validated checkpoint loaded from the store. The source
    /// checks it against the change tracking state of the table and returns the
    /// checkpoint a delta read may start at, or [`None`] to force a full read.
    fn check_checkpoint_validity(
        &self,
        executor: &QueryExecutor,
        connection: &mut Self::Connection,
        table_id: &TableId,
        metadata: &TableMetadata,
        previous: Option<&Checkpoint>,
    ) -> impl Future<Output = ExportResult<Option<Checkpoint>>> + Send;

    /// Streams the complete current contents of the table.
    ///
    /// Returns the checkpoint the table was at when the read started, so that
    /// the next run can attempt a delta read from it. A full read of an empty
    /// table still returns the checkpoint.
    fn stream_full(
        &self,
        stream: TableStream<'_, Self::Connection>,
    ) -> impl Future<Output = ExportResult<Option<Checkpoint>>> + Send;

    /// Streams only the rows recorded as changed after `checkpoint`.
    ///
    /// Returns the highest checkpoint observed among the streamed changes, or
    /// `checkpoint` itself when no changes were recorded.
    fn stream_delta(
        &self,
        stream: TableStream<'_, Self::Connection>,
        checkpoint: &Checkpoint,
    ) -> impl Future<Output = ExportResult<Option<Checkpoint>>> + Send;
}
