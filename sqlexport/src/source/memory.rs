use crate::bail;
use crate::concurrency::flow::FlowHandle;
use crate::connection::memory::MemoryConnection;
use crate::error::{ErrorKind, ExportError, ExportResult};
use crate::query::executor::QueryExecutor;
use crate::source::base::{TableSource, TableStream};
use crate::types::{Cell, Checkpoint, DiscoveredTableInfo, RowStatus, TableId, TableMetadata};

/// Position of the first data column in a delta row, after the change version,
/// the operation code and the commit time.
const DELTA_EXTRA_COLUMN_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// In-memory [`TableSource`] used in tests and examples.
///
/// Serves a fixed table list and streams rows from a scripted
/// [`MemoryConnection`], speaking a compact SQL dialect so tests can script the
/// exact statements a table export issues. Delta rows follow the change table
/// layout: change version, operation code and commit time first, data columns
/// after.
#[derive(Debug, Clone)]
pub struct MemorySource {
    tables: Vec<DiscoveredTableInfo>,
    change_tracking: bool,
    auto_enable_change_tracking: bool,
}

impl MemorySource {
    /// Creates a source with change tracking support for the given tables.
    pub fn new(tables: Vec<DiscoveredTableInfo>) -> Self {
        Self {
            tables,
            change_tracking: true,
            auto_enable_change_tracking: false,
        }
    }

    /// Creates a source that only supports full reads.
    pub fn without_change_tracking(tables: Vec<DiscoveredTableInfo>) -> Self {
        Self {
            tables,
            change_tracking: false,
            auto_enable_change_tracking: false,
        }
    }

    /// Makes the source enable change tracking on tables that do not have it yet.
    pub fn auto_enable_change_tracking(mut self) -> Self {
        self.auto_enable_change_tracking = true;
        self
    }

    /// The statement a full read streams rows with.
    pub fn full_read_sql(table_id: &TableId) -> String {
        format!("SELECT * FROM {table_id}")
    }

    /// The statement that captures the change version a full read starts at.
    pub fn current_version_sql(table_id: &TableId) -> String {
        format!(
            "USE [{}]; SELECT CHANGE_TRACKING_CURRENT_VERSION()",
            table_id.database
        )
    }

    /// The statement that looks up the oldest version a delta read may start from.
    pub fn min_valid_version_sql(table_id: &TableId) -> String {
        format!(
            "USE [{}]; SELECT CHANGE_TRACKING_MIN_VALID_VERSION('{}')",
            table_id.database,
            table_id.schema_qualified_name()
        )
    }

    /// The statement that turns change tracking on for a table.
    pub fn enable_change_tracking_sql(table_id: &TableId) -> String {
        format!("ALTER TABLE {table_id} ENABLE CHANGE_TRACKING")
    }

    /// The statement a delta read streams changes with.
    pub fn delta_read_sql(table_id: &TableId, checkpoint: &Checkpoint) -> String {
        format!(
            "USE [{}]; SELECT changes.* FROM CHANGETABLE(CHANGES {}, {}) AS changes",
            table_id.database,
            table_id.schema_qualified_name(),
            checkpoint
        )
    }
}

fn version_from_cell(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::I64(value) => Some(*value),
        Cell::I32(value) => Some(i64::from(*value)),
        Cell::String(value) => value.parse().ok(),
        _ => None,
    }
}

fn operation_from_cell(cell: Option<&Cell>) -> Option<ChangeOperation> {
    match cell {
        Some(Cell::String(code)) => match code.as_str() {
            "I" => Some(ChangeOperation::Insert),
            "U" => Some(ChangeOperation::Update),
            "D" => Some(ChangeOperation::Delete),
            _ => None,
        },
        _ => None,
    }
}

impl TableSource for MemorySource {
    type Connection = MemoryConnection;

    async fn discover_tables(
        &self,
        _executor: &QueryExecutor,
        _connection: &mut MemoryConnection,
    ) -> ExportResult<Vec<DiscoveredTableInfo>> {
        Ok(self.tables.clone())
    }

    fn supports_change_tracking(&self) -> bool {
        self.change_tracking
    }

    fn validate_checkpoint(&self, raw: &serde_json::Value) -> Option<Checkpoint> {
        raw.as_i64().map(Checkpoint::from)
    }

    async fn check_checkpoint_validity(
        &self,
        executor: &QueryExecutor,
        connection: &mut MemoryConnection,
        table_id: &TableId,
        metadata: &TableMetadata,
        previous: Option<&Checkpoint>,
    ) -> ExportResult<Option<Checkpoint>> {
        let previous_version = previous.and_then(Checkpoint::as_i64);

        if metadata.change_tracking_enabled && previous_version.is_some() {
            let cell = executor
                .query_single_value(
                    &mut *connection,
                    &Self::min_valid_version_sql(table_id),
                    false,
                )
                .await?;
            let min_valid = version_from_cell(&cell);
            let valid = matches!(
                (previous_version, min_valid),
                (Some(previous), Some(min)) if previous >= min
            );

            if valid {
                Ok(previous.cloned())
            } else {
                Ok(None)
            }
        } else if !metadata.change_tracking_enabled && self.auto_enable_change_tracking {
            executor
                .execute_without_results(connection, &Self::enable_change_tracking_sql(table_id))
                .await?;

            Ok(None)
        } else {
            Ok(None)
        }
    }

    async fn stream_full(
        &self,
        stream: TableStream<'_, MemoryConnection>,
    ) -> ExportResult<Option<Checkpoint>> {
        let TableStream {
            executor,
            connection,
            table_id,
            metadata,
            output,
            on_row,
            on_query_end,
        } = stream;

        let version_cell = executor
            .query_single_value(&mut *connection, &Self::current_version_sql(table_id), false)
            .await?;
        let Some(version) = version_from_cell(&version_cell) else {
            bail!(
                ErrorKind::InvalidData,
                "Change tracking version has an unexpected shape",
                format!("{version_cell:?}")
            );
        };

        let column_count = metadata.column_count();
        let mut adapter = |cells: &[Cell], flow: Option<&FlowHandle>| -> ExportResult<()> {
            for index in 0..column_count {
                output.values[index] = cells.get(index).cloned().unwrap_or(Cell::Null);
            }

            on_row(output, RowStatus::Normal, None, flow)
        };
        let mut done = |_rows_affected: &[u64]| on_query_end();

        executor
            .execute(
                connection,
                &Self::full_read_sql(table_id),
                &mut adapter,
                Some(&mut done),
            )
            .await?;

        Ok(Some(Checkpoint::from(version)))
    }

    async fn stream_delta(
        &self,
        stream: TableStream<'_, MemoryConnection>,
        checkpoint: &Checkpoint,
    ) -> ExportResult<Option<Checkpoint>> {
        let TableStream {
            executor,
            connection,
            table_id,
            metadata,
            output,
            on_row,
            on_query_end,
        } = stream;

        let column_count = metadata.column_count();
        let key_count = metadata.primary_key_column_count;
        let mut max_version: Option<i64> = None;

        let mut adapter = |cells: &[Cell], flow: Option<&FlowHandle>| -> ExportResult<()> {
            let Some(version) = cells.first().and_then(version_from_cell) else {
                bail!(
                    ErrorKind::InvalidData,
                    "Change row carried an unusable version",
                    format!("{:?}", cells.first())
                );
            };

            let status = match operation_from_cell(cells.get(1)) {
                Some(ChangeOperation::Delete) => {
                    // Deleted rows only have key columns, the rest is nulled out.
                    for value in output
                        .values
                        .iter_mut()
                        .take(column_count)
                        .skip(key_count)
                    {
                        *value = Cell::Null;
                    }

                    RowStatus::Deleted
                }
                Some(ChangeOperation::Insert) | Some(ChangeOperation::Update) => {
                    for index in key_count..column_count {
                        output.values[index] = cells
                            .get(index + DELTA_EXTRA_COLUMN_COUNT)
                            .cloned()
                            .unwrap_or(Cell::Null);
                    }

                    RowStatus::Normal
                }
                None => RowStatus::Invalid,
            };

            // Key columns come from the change table, so they are present even
            // for deleted rows.
            for index in 0..key_count {
                output.values[index] = cells
                    .get(index + DELTA_EXTRA_COLUMN_COUNT)
                    .cloned()
                    .unwrap_or(Cell::Null);
            }

            max_version = Some(max_version.map_or(version, |max| max.max(version)));

            let transaction_time = match cells.get(2) {
                Some(Cell::Timestamp(time)) => Some(*time),
                _ => None,
            };

            on_row(output, status, transaction_time, flow)
        };
        let mut done = |_rows_affected: &[u64]| on_query_end();

        executor
            .execute(
                connection,
                &Self::delta_read_sql(table_id, checkpoint),
                &mut adapter,
                Some(&mut done),
            )
            .await?;

        Ok(max_version
            .map(Checkpoint::from)
            .or_else(|| Some(checkpoint.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::memory::ScriptedQuery;
    use crate::events::bus::EventBus;
    use crate::types::OutputRow;
    use chrono::{TimeZone, Utc};

    fn orders_table() -> TableId {
        TableId::new("sales".to_string(), "dbo".to_string(), "orders".to_string())
    }

    fn orders_metadata(change_tracking_enabled: bool) -> TableMetadata {
        TableMetadata::new(
            vec!["id".to_string(), "total".to_string()],
            vec!["int".to_string(), "int".to_string()],
            1,
            change_tracking_enabled,
        )
    }

    fn source_for(table_id: &TableId, metadata: &TableMetadata) -> MemorySource {
        MemorySource::new(vec![DiscoveredTableInfo {
            table_id: table_id.clone(),
            metadata: metadata.clone(),
            row_event_interval: None,
        }])
    }

    struct SeenRow {
        values: Vec<Cell>,
        status: RowStatus,
        transaction_time: Option<chrono::DateTime<Utc>>,
    }

    async fn run_full(
        source: &MemorySource,
        connection: &mut MemoryConnection,
        table_id: &TableId,
        metadata: &TableMetadata,
    ) -> (ExportResult<Option<Checkpoint>>, Vec<SeenRow>, usize) {
        let executor = QueryExecutor::new(EventBus::new());
        let mut output = OutputRow::for_column_count(metadata.column_count());
        let mut seen = Vec::new();
        let mut query_ends = 0;

        let result = source
            .stream_full(TableStream {
                executor: &executor,
                connection,
                table_id,
                metadata,
                output: &mut output,
                on_row: &mut |row, status, transaction_time, _flow| {
                    seen.push(SeenRow {
                        values: row.values.clone(),
                        status,
                        transaction_time,
                    });
                    Ok(())
                },
                on_query_end: &mut || query_ends += 1,
            })
            .await;

        (result, seen, query_ends)
    }

    async fn run_delta(
        source: &MemorySource,
        connection: &mut MemoryConnection,
        table_id: &TableId,
        metadata: &TableMetadata,
        checkpoint: &Checkpoint,
    ) -> (ExportResult<Option<Checkpoint>>, Vec<SeenRow>, usize) {
        let executor = QueryExecutor::new(EventBus::new());
        let mut output = OutputRow::for_column_count(metadata.column_count());
        let mut seen = Vec::new();
        let mut query_ends = 0;

        let result = source
            .stream_delta(
                TableStream {
                    executor: &executor,
                    connection,
                    table_id,
                    metadata,
                    output: &mut output,
                    on_row: &mut |row, status, transaction_time, _flow| {
                        seen.push(SeenRow {
                            values: row.values.clone(),
                            status,
                            transaction_time,
                        });
                        Ok(())
                    },
                    on_query_end: &mut || query_ends += 1,
                },
                checkpoint,
            )
            .await;

        (result, seen, query_ends)
    }

    #[tokio::test]
    async fn full_read_captures_version_before_streaming() {
        let table_id = orders_table();
        let metadata = orders_metadata(true);
        let source = source_for(&table_id, &metadata);

        let mut connection = MemoryConnection::new();
        connection.script_query(
            ScriptedQuery::returning(vec![vec![Cell::I64(42)]])
                .expecting_sql(MemorySource::current_version_sql(&table_id)),
        );
        connection.script_query(
            ScriptedQuery::returning(vec![
                vec![Cell::I32(1), Cell::I32(100)],
                vec![Cell::I32(2), Cell::I32(200)],
            ])
            .expecting_sql(MemorySource::full_read_sql(&table_id)),
        );

        let (result, seen, query_ends) =
            run_full(&source, &mut connection, &table_id, &metadata).await;

        assert_eq!(result.unwrap(), Some(Checkpoint::from(42)));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].values[0], Cell::I32(1));
        assert_eq!(seen[0].values[1], Cell::I32(100));
        assert_eq!(seen[0].status, RowStatus::Normal);
        assert!(seen[0].transaction_time.is_none());
        assert_eq!(query_ends, 1);
    }

    #[tokio::test]
    async fn full_read_of_empty_table_still_returns_version() {
        let table_id = orders_table();
        let metadata = orders_metadata(true);
        let source = source_for(&table_id, &metadata);

        let mut connection = MemoryConnection::new();
        connection.script_query(ScriptedQuery::returning(vec![vec![Cell::I64(7)]]));
        connection.script_query(ScriptedQuery::empty());

        let (result, seen, query_ends) =
            run_full(&source, &mut connection, &table_id, &metadata).await;

        assert_eq!(result.unwrap(), Some(Checkpoint::from(7)));
        assert!(seen.is_empty());
        assert_eq!(query_ends, 1);
    }

    #[tokio::test]
    async fn full_read_rejects_unusable_version() {
        let table_id = orders_table();
        let metadata = orders_metadata(true);
        let source = source_for(&table_id, &metadata);

        let mut connection = MemoryConnection::new();
        connection.script_query(ScriptedQuery::returning(vec![vec![Cell::Null]]));

        let (result, seen, query_ends) =
            run_full(&source, &mut connection, &table_id, &metadata).await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(seen.is_empty());
        assert_eq!(query_ends, 0);
    }

    #[tokio::test]
    async fn delta_read_maps_operations_onto_row_statuses() {
        let table_id = orders_table();
        let metadata = orders_metadata(true);
        let source = source_for(&table_id, &metadata);
        let commit_time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let mut connection = MemoryConnection::new();
        connection.script_query(
            ScriptedQuery::returning(vec![
                vec![
                    Cell::I64(11),
                    Cell::String("I".to_string()),
                    Cell::Timestamp(commit_time),
                    Cell::I32(1),
                    Cell::I32(100),
                ],
                vec![
                    Cell::I64(13),
                    Cell::String("D".to_string()),
                    Cell::Null,
                    Cell::I32(2),
                    Cell::Null,
                ],
                vec![
                    Cell::I64(12),
                    Cell::String("X".to_string()),
                    Cell::Null,
                    Cell::I32(3),
                    Cell::I32(300),
                ],
            ])
            .expecting_sql(MemorySource::delta_read_sql(&table_id, &Checkpoint::from(10))),
        );

        let (result, seen, query_ends) = run_delta(
            &source,
            &mut connection,
            &table_id,
            &metadata,
            &Checkpoint::from(10),
        )
        .await;

        // The highest version wins even when it is not on the last row.
        assert_eq!(result.unwrap(), Some(Checkpoint::from(13)));
        assert_eq!(seen.len(), 3);

        assert_eq!(seen[0].status, RowStatus::Normal);
        assert_eq!(seen[0].values[0], Cell::I32(1));
        assert_eq!(seen[0].values[1], Cell::I32(100));
        assert_eq!(seen[0].transaction_time, Some(commit_time));

        assert_eq!(seen[1].status, RowStatus::Deleted);
        assert_eq!(seen[1].values[0], Cell::I32(2));
        assert_eq!(seen[1].values[1], Cell::Null);
        assert!(seen[1].transaction_time.is_none());

        // Invalid rows keep their key columns but non-key columns are whatever
        // the previous row left behind.
        assert_eq!(seen[2].status, RowStatus::Invalid);
        assert_eq!(seen[2].values[0], Cell::I32(3));
        assert_eq!(seen[2].values[1], Cell::Null);

        assert_eq!(query_ends, 1);
    }

    #[tokio::test]
    async fn delta_read_without_changes_returns_incoming_checkpoint() {
        let table_id = orders_table();
        let metadata = orders_metadata(true);
        let source = source_for(&table_id, &metadata);

        let mut connection = MemoryConnection::new();
        connection.script_query(ScriptedQuery::empty());

        let (result, seen, query_ends) = run_delta(
            &source,
            &mut connection,
            &table_id,
            &metadata,
            &Checkpoint::from(10),
        )
        .await;

        assert_eq!(result.unwrap(), Some(Checkpoint::from(10)));
        assert!(seen.is_empty());
        assert_eq!(query_ends, 1);
    }

    #[tokio::test]
    async fn delta_read_rejects_rows_without_versions() {
        let table_id = orders_table();
        let metadata = orders_metadata(true);
        let source = source_for(&table_id, &metadata);

        let mut connection = MemoryConnection::new();
        connection.script_query(ScriptedQuery::returning(vec![vec![
            Cell::Null,
            Cell::String("I".to_string()),
            Cell::Null,
            Cell::I32(1),
            Cell::I32(100),
        ]]));

        let (result, seen, _query_ends) = run_delta(
            &source,
            &mut connection,
            &table_id,
            &metadata,
            &Checkpoint::from(10),
        )
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidData);
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn validity_check_accepts_previous_checkpoint_at_or_above_minimum() {
        let table_id = orders_table();
        let metadata = orders_metadata(true);
        let source = source_for(&table_id, &metadata);
        let executor = QueryExecutor::new(EventBus::new());

        let mut connection = MemoryConnection::new();
        connection.script_query(
            ScriptedQuery::returning(vec![vec![Cell::I64(5)]])
                .expecting_sql(MemorySource::min_valid_version_sql(&table_id)),
        );

        let current = source
            .check_checkpoint_validity(
                &executor,
                &mut connection,
                &table_id,
                &metadata,
                Some(&Checkpoint::from(10)),
            )
            .await
            .unwrap();

        assert_eq!(current, Some(Checkpoint::from(10)));
    }

    #[tokio::test]
    async fn validity_check_discards_previous_checkpoint_below_minimum() {
        let table_id = orders_table();
        let metadata = orders_metadata(true);
        let source = source_for(&table_id, &metadata);
        let executor = QueryExecutor::new(EventBus::new());

        let mut connection = MemoryConnection::new();
        connection.script_query(ScriptedQuery::returning(vec![vec![Cell::I64(20)]]));

        let current = source
            .check_checkpoint_validity(
                &executor,
                &mut connection,
                &table_id,
                &metadata,
                Some(&Checkpoint::from(10)),
            )
            .await
            .unwrap();

        assert!(current.is_none());
    }

    #[tokio::test]
    async fn validity_check_treats_null_minimum_as_invalid() {
        let table_id = orders_table();
        let metadata = orders_metadata(true);
        let source = source_for(&table_id, &metadata);
        let executor = QueryExecutor::new(EventBus::new());

        let mut connection = MemoryConnection::new();
        connection.script_query(ScriptedQuery::returning(vec![vec![Cell::Null]]));

        let current = source
            .check_checkpoint_validity(
                &executor,
                &mut connection,
                &table_id,
                &metadata,
                Some(&Checkpoint::from(10)),
            )
            .await
            .unwrap();

        assert!(current.is_none());
    }

    #[tokio::test]
    async fn validity_check_enables_change_tracking_when_asked_to() {
        let table_id = orders_table();
        let metadata = orders_metadata(false);
        let source = source_for(&table_id, &metadata).auto_enable_change_tracking();
        let executor = QueryExecutor::new(EventBus::new());

        let mut connection = MemoryConnection::new();
        connection.script_query(
            ScriptedQuery::empty()
                .expecting_sql(MemorySource::enable_change_tracking_sql(&table_id)),
        );

        let current = source
            .check_checkpoint_validity(&executor, &mut connection, &table_id, &metadata, None)
            .await
            .unwrap();

        assert!(current.is_none());
        assert_eq!(
            connection.executed_sql(),
            vec![MemorySource::enable_change_tracking_sql(&table_id)]
        );
    }

    #[tokio::test]
    async fn validity_check_without_auto_enable_leaves_the_table_alone() {
        let table_id = orders_table();
        let metadata = orders_metadata(false);
        let source = source_for(&table_id, &metadata);
        let executor = QueryExecutor::new(EventBus::new());

        let mut connection = MemoryConnection::new();

        let current = source
            .check_checkpoint_validity(&executor, &mut connection, &table_id, &metadata, None)
            .await
            .unwrap();

        assert!(current.is_none());
        assert!(connection.executed_sql().is_empty());
    }

    #[tokio::test]
    async fn checkpoint_validation_only_accepts_integers() {
        let source = source_for(&orders_table(), &orders_metadata(true));

        assert_eq!(
            source.validate_checkpoint(&serde_json::json!(42)),
            Some(Checkpoint::from(42))
        );
        assert!(source.validate_checkpoint(&serde_json::json!("42")).is_none());
        assert!(source.validate_checkpoint(&serde_json::json!(null)).is_none());
        assert!(
            source
                .validate_checkpoint(&serde_json::json!({"version": 42}))
                .is_none()
        );
    }
}
