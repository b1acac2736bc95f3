//! Reconciliation of stored checkpoints against the source before streaming.
//!
//! Decides per table whether the upcoming read can be a delta against a stored
//! checkpoint or must fall back to a full read, and whether the checkpoint seen
//! by a finished run needs to be persisted.

use crate::error::ExportResult;
use crate::query::executor::QueryExecutor;
use crate::source::base::TableSource;
use crate::store::base::CheckpointStore;
use crate::types::{Checkpoint, TableId, TableMetadata};

/// The two checkpoints established before a table export streams rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReconciledCheckpoints {
    /// The validated checkpoint loaded from the store, if any
    pub previous: Option<Checkpoint>,
    /// The checkpoint the upcoming read may resume from, if any
    pub current: Option<Checkpoint>,
}

/// Reads the stored checkpoint for a table and reconciles it with the source.
///
/// The raw stored value is decoded by the source's validator; a value that does
/// not validate counts as absent and downgrades the run to a full read. The
/// validated checkpoint is then checked against the change tracking state of
/// the table, which decides whether the upcoming read may be a delta.
///
/// Store read failures abort the table export instead of downgrading, so a
/// broken store cannot silently turn every run into a full read.
pub async fn reconcile_checkpoints<S, P>(
    source: &S,
    store: &P,
    executor: &QueryExecutor,
    connection: &mut S::Connection,
    table_id: &TableId,
    metadata: &TableMetadata,
) -> ExportResult<ReconciledCheckpoints>
where
    S: TableSource,
    P: CheckpointStore,
{
    let raw = store.read_checkpoint(table_id).await?;
    let previous = raw.as_ref().and_then(|raw| source.validate_checkpoint(raw));
    let current = source
        .check_checkpoint_validity(executor, connection, table_id, metadata, previous.as_ref())
        .await?;

    Ok(ReconciledCheckpoints { previous, current })
}

/// Decides which checkpoint, if any, must be persisted after a successful run.
///
/// Only a checkpoint that differs from the previously stored one is written, so
/// repeated runs without changes never touch the store.
pub fn checkpoint_to_persist<'a>(
    previous: Option<&Checkpoint>,
    seen: Option<&'a Checkpoint>,
) -> Option<&'a Checkpoint> {
    match seen {
        Some(seen) if previous != Some(seen) => Some(seen),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::memory::{MemoryConnection, ScriptedQuery};
    use crate::error::ErrorKind;
    use crate::events::bus::EventBus;
    use crate::source::memory::MemorySource;
    use crate::store::memory::MemoryCheckpointStore;
    use crate::types::{Cell, DiscoveredTableInfo};

    fn orders_table() -> TableId {
        TableId::new("sales".to_string(), "dbo".to_string(), "orders".to_string())
    }

    fn orders_metadata() -> TableMetadata {
        TableMetadata::new(
            vec!["id".to_string(), "total".to_string()],
            vec!["int".to_string(), "int".to_string()],
            1,
            true,
        )
    }

    fn source_for(table_id: &TableId, metadata: &TableMetadata) -> MemorySource {
        MemorySource::new(vec![DiscoveredTableInfo {
            table_id: table_id.clone(),
            metadata: metadata.clone(),
            row_event_interval: None,
        }])
    }

    #[tokio::test]
    async fn stored_checkpoint_survives_reconciliation_when_still_valid() {
        let table_id = orders_table();
        let metadata = orders_metadata();
        let source = source_for(&table_id, &metadata);
        let store = MemoryCheckpointStore::new();
        store
            .insert_raw_checkpoint(table_id.clone(), serde_json::json!(10))
            .await;

        let executor = QueryExecutor::new(EventBus::new());
        let mut connection = MemoryConnection::new();
        connection.script_query(
            ScriptedQuery::returning(vec![vec![Cell::I64(5)]])
                .expecting_sql(MemorySource::min_valid_version_sql(&table_id)),
        );

        let reconciled = reconcile_checkpoints(
            &source,
            &store,
            &executor,
            &mut connection,
            &table_id,
            &metadata,
        )
        .await
        .unwrap();

        assert_eq!(reconciled.previous, Some(Checkpoint::from(10)));
        assert_eq!(reconciled.current, Some(Checkpoint::from(10)));
    }

    #[tokio::test]
    async fn unusable_stored_value_downgrades_to_full_read() {
        let table_id = orders_table();
        let metadata = orders_metadata();
        let source = source_for(&table_id, &metadata);
        let store = MemoryCheckpointStore::new();
        store
            .insert_raw_checkpoint(table_id.clone(), serde_json::json!("not a version"))
            .await;

        let executor = QueryExecutor::new(EventBus::new());
        let mut connection = MemoryConnection::new();

        let reconciled = reconcile_checkpoints(
            &source,
            &store,
            &executor,
            &mut connection,
            &table_id,
            &metadata,
        )
        .await
        .unwrap();

        assert_eq!(reconciled, ReconciledCheckpoints::default());
        // No validity query runs when there is no usable previous checkpoint.
        assert!(connection.executed_sql().is_empty());
    }

    #[tokio::test]
    async fn empty_store_reconciles_to_a_full_read() {
        let table_id = orders_table();
        let metadata = orders_metadata();
        let source = source_for(&table_id, &metadata);
        let store = MemoryCheckpointStore::new();

        let executor = QueryExecutor::new(EventBus::new());
        let mut connection = MemoryConnection::new();

        let reconciled = reconcile_checkpoints(
            &source,
            &store,
            &executor,
            &mut connection,
            &table_id,
            &metadata,
        )
        .await
        .unwrap();

        assert_eq!(reconciled, ReconciledCheckpoints::default());
    }

    #[tokio::test]
    async fn store_read_failures_abort_reconciliation() {
        let table_id = orders_table();
        let metadata = orders_metadata();
        let source = source_for(&table_id, &metadata);
        let store = MemoryCheckpointStore::new();
        store.fail_reads().await;

        let executor = QueryExecutor::new(EventBus::new());
        let mut connection = MemoryConnection::new();

        let err = reconcile_checkpoints(
            &source,
            &store,
            &executor,
            &mut connection,
            &table_id,
            &metadata,
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IoError);
    }

    #[test]
    fn only_changed_checkpoints_are_persisted() {
        let ten = Checkpoint::from(10);
        let twenty = Checkpoint::from(20);

        assert_eq!(checkpoint_to_persist(None, None), None);
        assert_eq!(checkpoint_to_persist(Some(&ten), None), None);
        assert_eq!(checkpoint_to_persist(Some(&ten), Some(&ten)), None);
        assert_eq!(checkpoint_to_persist(Some(&ten), Some(&twenty)), Some(&twenty));
        assert_eq!(checkpoint_to_persist(None, Some(&ten)), Some(&ten));
    }
}
