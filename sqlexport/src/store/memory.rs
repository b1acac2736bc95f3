use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, ExportError, ExportResult};
use crate::store::base::CheckpointStore;
use crate::types::{Checkpoint, TableId};

#[derive(Debug)]
struct Inner {
    checkpoints: HashMap<TableId, serde_json::Value>,
    write_log: Vec<(TableId, Checkpoint)>,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-memory [`CheckpointStore`] used in tests and examples.
///
/// Keeps all checkpoints in a [`HashMap`] and records every write so tests can
/// assert how often a table's checkpoint was persisted. Reads and writes can be
/// toggled to fail for exercising store error paths.
#[derive(Debug, Clone)]
pub struct MemoryCheckpointStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        let inner = Inner {
            checkpoints: HashMap::new(),
            write_log: Vec::new(),
            fail_reads: false,
            fail_writes: false,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Seeds a raw checkpoint value for `table_id` without going through
    /// [`CheckpointStore::write_checkpoint`].
    pub async fn insert_raw_checkpoint(&self, table_id: TableId, value: serde_json::Value) {
        let mut inner = self.inner.lock().await;

        inner.checkpoints.insert(table_id, value);
    }

    /// Returns the raw value currently stored for `table_id`.
    pub async fn stored_checkpoint(&self, table_id: &TableId) -> Option<serde_json::Value> {
        let inner = self.inner.lock().await;

        inner.checkpoints.get(table_id).cloned()
    }

    /// Returns how many times a checkpoint was written for `table_id`.
    pub async fn write_count(&self, table_id: &TableId) -> usize {
        let inner = self.inner.lock().await;

        inner
            .write_log
            .iter()
            .filter(|(id, _)| id == table_id)
            .count()
    }

    /// Makes every subsequent read fail with an [`ErrorKind::IoError`].
    pub async fn fail_reads(&self) {
        let mut inner = self.inner.lock().await;

        inner.fail_reads = true;
    }

    /// Makes every subsequent write fail with an [`ErrorKind::IoError`].
    pub async fn fail_writes(&self) {
        let mut inner = self.inner.lock().await;

        inner.fail_writes = true;
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn read_checkpoint(&self, table_id: &TableId) -> ExportResult<Option<serde_json::Value>> {
        let inner = self.inner.lock().await;

        if inner.fail_reads {
            bail!(
                ErrorKind::IoError,
                "Checkpoint store read failed",
                format!("reading checkpoint for table {table_id}")
            );
        }

        Ok(inner.checkpoints.get(table_id).cloned())
    }

    async fn write_checkpoint(
        &self,
        table_id: &TableId,
        checkpoint: &Checkpoint,
    ) -> ExportResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.fail_writes {
            bail!(
                ErrorKind::IoError,
                "Checkpoint store write failed",
                format!("writing checkpoint for table {table_id}")
            );
        }

        inner
            .checkpoints
            .insert(table_id.clone(), checkpoint.clone().into_inner());
        inner.write_log.push((table_id.clone(), checkpoint.clone()));

        Ok(())
    }
}
