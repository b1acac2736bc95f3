use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::concurrency::flow::FlowHandle;
use crate::error::{ErrorKind, ExportError, ExportResult};
use crate::export_error;
use crate::sink::base::{CreatedSink, RowSink, SinkAction, SinkFactory, SinkRequest};
use crate::types::{OutputRow, TableId, BOOKKEEPING_COLUMN_COUNT};

/// The creation arguments a [`MemorySinkFactory`] saw for one sink.
#[derive(Debug, Clone)]
pub struct RecordedSinkRequest {
    pub table_id: TableId,
    pub additional_columns: [&'static str; BOOKKEEPING_COLUMN_COUNT],
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: HashMap<TableId, Vec<OutputRow>>,
    requests: Vec<RecordedSinkRequest>,
    ends_seen: HashMap<TableId, usize>,
    reset_after_rows: Option<u64>,
    fail_creation_for: HashSet<TableId>,
    fail_process_for: HashSet<TableId>,
    fail_completion_for: HashSet<TableId>,
}

/// In-memory [`SinkFactory`] used in tests and examples.
///
/// Records every row each table's sinks accepted, how often sinks were created
/// and finalized, and can be configured to fail at creation, per row or in the
/// background completion work.
#[derive(Debug, Clone)]
pub struct MemorySinkFactory {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Returns the rows accepted for `table_id` across all its sink instances.
    pub fn rows_for(&self, table_id: &TableId) -> Vec<OutputRow> {
        lock_inner(&self.inner)
            .rows
            .get(table_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns how many sinks were created for `table_id`.
    pub fn sinks_created(&self, table_id: &TableId) -> usize {
        lock_inner(&self.inner)
            .requests
            .iter()
            .filter(|request| &request.table_id == table_id)
            .count()
    }

    /// Returns the creation arguments of every sink, in creation order.
    pub fn requests(&self) -> Vec<RecordedSinkRequest> {
        lock_inner(&self.inner).requests.clone()
    }

    /// Returns how often sinks for `table_id` were finalized, counting both
    /// resets and end of stream.
    pub fn ends_seen(&self, table_id: &TableId) -> usize {
        lock_inner(&self.inner)
            .ends_seen
            .get(table_id)
            .copied()
            .unwrap_or(0)
    }

    /// Makes every sink ask for a reset after accepting `rows` rows.
    pub fn reset_after_rows(&self, rows: u64) {
        lock_inner(&self.inner).reset_after_rows = Some(rows);
    }

    /// Makes sink creation fail for `table_id`.
    pub fn fail_creation_for(&self, table_id: TableId) {
        lock_inner(&self.inner).fail_creation_for.insert(table_id);
    }

    /// Makes every processed row fail for `table_id`.
    pub fn fail_process_for(&self, table_id: TableId) {
        lock_inner(&self.inner).fail_process_for.insert(table_id);
    }

    /// Makes the background completion work fail for `table_id`.
    pub fn fail_completion_for(&self, table_id: TableId) {
        lock_inner(&self.inner).fail_completion_for.insert(table_id);
    }
}

impl Default for MemorySinkFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkFactory for MemorySinkFactory {
    type Sink = MemorySink;

    fn create_sink(&self, request: SinkRequest<'_>) -> ExportResult<CreatedSink<MemorySink>> {
        let mut inner = lock_inner(&self.inner);

        if inner.fail_creation_for.contains(request.table_id) {
            return Err(export_error!(
                ErrorKind::SinkFailed,
                "Sink creation failed",
                request.table_id.to_string()
            ));
        }

        inner.requests.push(RecordedSinkRequest {
            table_id: request.table_id.clone(),
            additional_columns: request.additional_columns,
            started_at: request.started_at,
        });

        let completion = if inner.fail_completion_for.contains(request.table_id) {
            let error = export_error!(
                ErrorKind::SinkFailed,
                "Sink upload failed",
                request.table_id.to_string()
            );
            vec![tokio::spawn(async move { Err(error) })]
        } else {
            Vec::new()
        };

        Ok(CreatedSink {
            sink: MemorySink {
                inner: self.inner.clone(),
                table_id: request.table_id.clone(),
                rows_accepted: 0,
            },
            completion,
        })
    }
}

/// One sink instance handed out by [`MemorySinkFactory`].
#[derive(Debug)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
    table_id: TableId,
    rows_accepted: u64,
}

impl RowSink for MemorySink {
    fn process(&mut self, row: &OutputRow, _flow: Option<&FlowHandle>) -> ExportResult<SinkAction> {
        let mut inner = lock_inner(&self.inner);

        if inner.fail_process_for.contains(&self.table_id) {
            return Err(export_error!(
                ErrorKind::SinkFailed,
                "Sink rejected a row",
                self.table_id.to_string()
            ));
        }

        inner
            .rows
            .entry(self.table_id.clone())
            .or_default()
            .push(row.clone());
        self.rows_accepted += 1;

        match inner.reset_after_rows {
            Some(limit) if self.rows_accepted >= limit => Ok(SinkAction::Reset),
            _ => Ok(SinkAction::Continue),
        }
    }

    fn end(&mut self) {
        let mut inner = lock_inner(&self.inner);

        *inner.ends_seen.entry(self.table_id.clone()).or_insert(0) += 1;
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> std::sync::MutexGuard<'_, Inner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
