use sqlexport_config::shared::{ExportConfig, PipelineConfig, SqlConnectionConfig};

use crate::connection::memory::{MemoryConnection, MemoryPool};
use crate::pipeline::ExportPipeline;
use crate::sink::base::SinkFactory;
use crate::source::base::TableSource;
use crate::store::base::CheckpointStore;
use crate::types::PipelineId;

/// Builds a pipeline configuration pointing at a scripted in-memory server.
pub fn test_pipeline_config(pipeline_id: PipelineId, row_event_interval: u64) -> PipelineConfig {
    PipelineConfig {
        id: pipeline_id,
        connection: SqlConnectionConfig {
            host: "localhost".to_owned(),
            port: 1433,
            database: "sales".to_owned(),
            username: "exporter".to_owned(),
            password: None,
        },
        export: ExportConfig {
            row_event_interval,
            auto_enable_change_tracking: false,
        },
    }
}

pub fn create_pipeline<S, P, F>(
    pipeline_id: PipelineId,
    row_event_interval: u64,
    pool: MemoryPool,
    source: S,
    store: P,
    sink_factory: F,
) -> ExportPipeline<MemoryPool, S, P, F>
where
    S: TableSource<Connection = MemoryConnection>,
    P: CheckpointStore,
    F: SinkFactory,
{
    ExportPipeline::new(
        test_pipeline_config(pipeline_id, row_event_interval),
        pool,
        source,
        store,
        sink_factory,
    )
}
