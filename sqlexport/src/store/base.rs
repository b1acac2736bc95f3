use std::future::Future;

use crate::error::ExportResult;
use crate::types::{Checkpoint, TableId};

/// This trait represents a persistent store for per table change tracking
/// checkpoints.
///
/// A checkpoint written after a successful export run is read back at the start
/// of the next run to decide between a delta read and a full read. Reads return
/// the raw stored value without interpreting it, since only the source connector
/// knows which shapes are usable checkpoints.
pub trait CheckpointStore: Send + Sync {
    /// Returns the raw stored checkpoint for `table_id`, or [`None`] when no
    /// checkpoint has been written for that table yet.
    ///
    /// Failures from the backing store are surfaced as errors and abort the
    /// table export, since silently falling back to a full read would hide a
    /// broken store.
    fn read_checkpoint(
        &self,
        table_id: &TableId,
    ) -> impl Future<Output = ExportResult<Option<serde_json::Value>>> + Send;

    /// Persists `checkpoint` as the new stored value for `table_id`,
    /// overwriting any previous value.
    ///
    /// Callers only invoke this after a successful run and only when the new
    /// checkpoint differs from the previously stored one.
    fn write_checkpoint(
        &self,
        table_id: &TableId,
        checkpoint: &Checkpoint,
    ) -> impl Future<Output = ExportResult<()>> + Send;
}
