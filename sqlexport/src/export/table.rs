use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::concurrency::flow::FlowHandle;
use crate::concurrency::side_work::SideWorkRegistry;
use crate::error::{ExportError, ExportResult};
use crate::events::bus::EventBus;
use crate::query::executor::QueryExecutor;
use crate::reconcile::{checkpoint_to_persist, reconcile_checkpoints};
use crate::sink::base::{RowSink, SinkAction, SinkFactory, SinkRequest};
use crate::source::base::{TableSource, TableStream};
use crate::store::base::CheckpointStore;
use crate::types::{
    BOOKKEEPING_COLUMN_NAMES, ChangeTrackingVersionUploadedEvent, Checkpoint, CheckpointPair,
    ExportEvent, InvalidRowSeenEvent, OutputRow, RowStatus, TableChangeTrackVersionSeenEvent,
    TableExportContext, TableExportEndEvent, TableExportProgressEvent, TableExportStartEvent,
    TableId,
};

/// The lifecycle phase of a single table export.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TableExportPhase {
    /// Set before the export has touched the table
    Idle,

    /// Set while the stored checkpoint is reconciled against the source
    PreparingCheckpoint,

    /// Set while rows are streamed from the source into the sink
    Streaming,

    /// Set while background sink work is joined
    Finalizing,

    /// Set when the export finished without captured errors
    Completed,

    /// Set when the export finished with at least one captured error
    Failed,
}

/// What a finished table export reports back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct TableExportOutcome {
    /// The validated checkpoint that was stored before this run
    pub previous_checkpoint: Option<Checkpoint>,
    /// The checkpoint reconciliation allowed this run to resume from
    pub reconciled_checkpoint: Option<Checkpoint>,
    /// How many rows were forwarded to the sink
    pub rows_processed: u64,
}

/// Exports a single table end to end.
///
/// The run reconciles the stored checkpoint, streams either a delta or a full
/// read, stamps every valid row with the bookkeeping columns, feeds rows into a
/// sink created lazily on the first valid row, joins the sink's background work
/// and finally persists the observed checkpoint when it changed.
///
/// Errors during streaming and during background work are captured rather than
/// propagated immediately, so the end event always fires and carries them. Only
/// reconciliation failures abort the run before any table event is emitted.
pub struct TableExport<'a, S, P, F>
where
    S: TableSource,
    P: CheckpointStore,
    F: SinkFactory,
{
    source: &'a S,
    store: &'a P,
    sink_factory: &'a F,
    executor: &'a QueryExecutor,
    connection: &'a mut S::Connection,
    bus: EventBus,
    context: TableExportContext,
    row_event_interval: u64,
}

impl<'a, S, P, F> TableExport<'a, S, P, F>
where
    S: TableSource,
    P: CheckpointStore,
    F: SinkFactory,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: &'a S,
        store: &'a P,
        sink_factory: &'a F,
        executor: &'a QueryExecutor,
        connection: &'a mut S::Connection,
        bus: EventBus,
        context: TableExportContext,
        row_event_interval: u64,
    ) -> Self {
        Self {
            source,
            store,
            sink_factory,
            executor,
            connection,
            bus,
            context,
            row_event_interval,
        }
    }

    pub async fn run(mut self) -> ExportResult<TableExportOutcome> {
        let mut phase = TableExportPhase::Idle;
        let started_at = Utc::now();
        let started_instant = Instant::now();
        let table_id = self.context.table_id.clone();
        let metadata = self.context.metadata.clone();

        advance(&mut phase, TableExportPhase::PreparingCheckpoint, &table_id);
        let reconciled = if self.source.supports_change_tracking() {
            Some(
                reconcile_checkpoints(
                    self.source,
                    self.store,
                    self.executor,
                    &mut *self.connection,
                    &table_id,
                    &metadata,
                )
                .await?,
            )
        } else {
            None
        };
        let checkpoints = CheckpointPair {
            current: reconciled.as_ref().and_then(|r| r.current.clone()),
            previous: reconciled.as_ref().and_then(|r| r.previous.clone()),
        };

        advance(&mut phase, TableExportPhase::Streaming, &table_id);
        self.bus
            .emit(ExportEvent::TableExportStart(TableExportStartEvent {
                context: self.context.clone(),
            }));
        self.bus.emit(ExportEvent::TableChangeTrackVersionSeen(
            TableChangeTrackVersionSeenEvent {
                context: self.context.clone(),
                checkpoints: checkpoints.clone(),
            },
        ));

        let mut errors: Vec<ExportError> = Vec::new();
        let mut rows_processed: u64 = 0;
        let side_work = SideWorkRegistry::new();

        let seen = {
            let sink_cell: Mutex<Option<F::Sink>> = Mutex::new(None);
            let mut output = OutputRow::for_column_count(metadata.column_count());

            let mut on_row = |row: &mut OutputRow,
                              status: RowStatus,
                              transaction_time: Option<DateTime<Utc>>,
                              flow: Option<&FlowHandle>|
             -> ExportResult<()> {
                if status == RowStatus::Invalid {
                    self.bus.emit(ExportEvent::InvalidRowSeen(InvalidRowSeenEvent {
                        context: self.context.clone(),
                        checkpoints: checkpoints.clone(),
                        current_row_index: rows_processed,
                        row: row.clone(),
                    }));

                    return Ok(());
                }

                let changed_at = transaction_time.unwrap_or(started_at);
                let deleted_at = (status == RowStatus::Deleted).then_some(changed_at);
                row.stamp_bookkeeping(started_at, changed_at, deleted_at);
                rows_processed += 1;

                if self.row_event_interval > 0 && rows_processed % self.row_event_interval == 0 {
                    self.bus
                        .emit(ExportEvent::TableExportProgress(TableExportProgressEvent {
                            context: self.context.clone(),
                            checkpoints: checkpoints.clone(),
                            current_row_index: rows_processed,
                        }));
                }

                let mut sink = lock_sink(&sink_cell);
                if sink.is_none() {
                    let created = self.sink_factory.create_sink(SinkRequest {
                        table_id: &self.context.table_id,
                        metadata: &self.context.metadata,
                        additional_columns: BOOKKEEPING_COLUMN_NAMES,
                        started_at,
                    })?;
                    for handle in created.completion {
                        side_work.register(handle);
                    }
                    *sink = Some(created.sink);
                }
                if let Some(active) = sink.as_mut() {
                    if active.process(row, flow)? == SinkAction::Reset {
                        if let Some(mut finished) = sink.take() {
                            finished.end();
                        }
                    }
                }

                Ok(())
            };
            let mut on_query_end = || {
                if let Some(mut finished) = lock_sink(&sink_cell).take() {
                    finished.end();
                }
            };

            let stream = TableStream {
                executor: self.executor,
                connection: &mut *self.connection,
                table_id: &table_id,
                metadata: &metadata,
                output: &mut output,
                on_row: &mut on_row,
                on_query_end: &mut on_query_end,
            };

            let stream_result = match checkpoints.current.as_ref() {
                Some(checkpoint) => self.source.stream_delta(stream, checkpoint).await,
                None => self.source.stream_full(stream).await,
            };

            match stream_result {
                Ok(seen) => seen,
                Err(error) => {
                    errors.push(error);
                    None
                }
            }
        };

        advance(&mut phase, TableExportPhase::Finalizing, &table_id);
        if let Err(error) = side_work.join_all().await {
            errors.push(error);
        }

        self.bus
            .emit(ExportEvent::TableExportEnd(TableExportEndEvent {
                context: self.context.clone(),
                checkpoints: checkpoints.clone(),
                rows_processed_total: rows_processed,
                duration: started_instant.elapsed(),
                errors: errors.iter().cloned().map(Arc::new).collect(),
            }));

        if !errors.is_empty() {
            advance(&mut phase, TableExportPhase::Failed, &table_id);

            return Err(errors.into());
        }

        if let Some(reconciled) = &reconciled {
            if let Some(to_persist) =
                checkpoint_to_persist(reconciled.previous.as_ref(), seen.as_ref())
            {
                self.store.write_checkpoint(&table_id, to_persist).await?;
                self.bus.emit(ExportEvent::ChangeTrackingVersionUploaded(
                    ChangeTrackingVersionUploadedEvent {
                        context: self.context.clone(),
                        previous: reconciled.previous.clone(),
                        version: to_persist.clone(),
                    },
                ));
            }
        }

        advance(&mut phase, TableExportPhase::Completed, &table_id);

        Ok(TableExportOutcome {
            previous_checkpoint: checkpoints.previous,
            reconciled_checkpoint: checkpoints.current,
            rows_processed,
        })
    }
}

fn advance(phase: &mut TableExportPhase, next: TableExportPhase, table_id: &TableId) {
    debug!("table export for {} moving from {:?} to {:?}", table_id, phase, next);
    *phase = next;
}

fn lock_sink<S>(cell: &Mutex<Option<S>>) -> std::sync::MutexGuard<'_, Option<S>> {
    match cell.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
