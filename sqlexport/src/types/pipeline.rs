/// Unique identifier for an export pipeline.
pub type PipelineId = u64;
