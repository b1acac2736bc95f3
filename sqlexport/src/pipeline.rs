//! Core pipeline orchestration and execution.
//!
//! Contains the main [`ExportPipeline`] struct that runs a multi-table export
//! end to end: it acquires one pooled connection, discovers the tables to
//! export, waits for listener side work and then exports every table in
//! sequence on that connection.

use std::sync::Arc;

use tracing::{info, warn};

use crate::concurrency::side_work::SideWorkRegistry;
use crate::connection::base::ConnectionPool;
use crate::error::{ExportError, ExportResult};
use crate::events::bus::EventBus;
use crate::export::table::TableExport;
use crate::query::executor::QueryExecutor;
use crate::sink::base::SinkFactory;
use crate::source::base::TableSource;
use crate::store::base::CheckpointStore;
use crate::types::{
    DataTablesDiscoveredEvent, ExportEvent, PipelineId, TableExportContext,
};
use sqlexport_config::shared::PipelineConfig;

/// Orchestrates the export of every discovered table over one pooled connection.
///
/// Tables are exported strictly in sequence, so the source system never serves
/// more than one export query at a time. A failing table does not stop the run;
/// its error is kept and the remaining tables are still exported. After the
/// last table the captured errors are raised together, in table order.
///
/// All progress is observable through the pipeline's [`EventBus`], which
/// listeners subscribe to before calling [`ExportPipeline::run`].
pub struct ExportPipeline<Pool, S, P, F> {
    config: Arc<PipelineConfig>,
    pool: Pool,
    source: S,
    store: P,
    sink_factory: F,
    bus: EventBus,
    executor: QueryExecutor,
}

impl<Pool, S, P, F> ExportPipeline<Pool, S, P, F>
where
    Pool: ConnectionPool,
    S: TableSource<Connection = Pool::Connection>,
    P: CheckpointStore,
    F: SinkFactory,
{
    /// Creates a new pipeline with the given configuration.
    ///
    /// The pipeline does nothing until [`ExportPipeline::run`] is called, so
    /// callers can register event listeners on [`ExportPipeline::bus`] first.
    pub fn new(config: PipelineConfig, pool: Pool, source: S, store: P, sink_factory: F) -> Self {
        let bus = EventBus::new();
        let executor = QueryExecutor::new(bus.clone());

        Self {
            config: Arc::new(config),
            pool,
            source,
            store,
            sink_factory,
            bus,
            executor,
        }
    }

    /// Returns the unique identifier for this pipeline.
    pub fn id(&self) -> PipelineId {
        self.config.id
    }

    /// Returns the event bus this pipeline reports on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Runs the export once over all discovered tables.
    ///
    /// The connection is acquired scoped to this call and released on every
    /// exit path. Discovery failures and side work failures abort the run
    /// before the first table; per table failures are collected and raised
    /// together after the last table finished.
    pub async fn run(&self) -> ExportResult<()> {
        info!(
            "starting export pipeline {} against database {}",
            self.config.id, self.config.connection.database
        );

        let mut connection = self.pool.acquire().await?;

        let tables = self
            .source
            .discover_tables(&self.executor, &mut connection)
            .await?;
        info!("discovered {} tables to export", tables.len());

        let side_work = SideWorkRegistry::new();
        self.bus
            .emit(ExportEvent::DataTablesDiscovered(DataTablesDiscoveredEvent {
                tables: tables.clone(),
                side_work: side_work.clone(),
            }));
        side_work.join_all().await?;

        let mut errors: Vec<ExportError> = Vec::new();
        let table_count = tables.len();
        for (table_index, table) in tables.into_iter().enumerate() {
            let row_event_interval = table
                .row_event_interval
                .unwrap_or(self.config.export.row_event_interval);
            let context = TableExportContext {
                table_index,
                table_count,
                table_id: table.table_id.clone(),
                metadata: table.metadata,
            };

            let export = TableExport::new(
                &self.source,
                &self.store,
                &self.sink_factory,
                &self.executor,
                &mut connection,
                self.bus.clone(),
                context,
                row_event_interval,
            );

            if let Err(error) = export.run().await {
                warn!("table export for {} failed: {}", table.table_id, error);
                errors.push(error);
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        info!("export pipeline {} completed", self.config.id);

        Ok(())
    }
}
