use chrono::{DateTime, Utc};

use crate::connection::memory::{MemoryConnection, ScriptedQuery};
use crate::source::memory::MemorySource;
use crate::types::{Cell, Checkpoint, DiscoveredTableInfo, TableId, TableMetadata};

/// Builds a table id inside the test database.
pub fn test_table_id(name: &str) -> TableId {
    TableId::new("sales".to_string(), "dbo".to_string(), name.to_string())
}

/// Builds metadata for a two column table keyed on its first integer column.
pub fn int_pair_metadata(change_tracking_enabled: bool) -> TableMetadata {
    TableMetadata::new(
        vec!["id".to_string(), "total".to_string()],
        vec!["int".to_string(), "int".to_string()],
        1,
        change_tracking_enabled,
    )
}

/// Builds a discovered table with the standard two column layout.
pub fn test_table(name: &str) -> DiscoveredTableInfo {
    DiscoveredTableInfo {
        table_id: test_table_id(name),
        metadata: int_pair_metadata(true),
        row_event_interval: None,
    }
}

/// Builds a source row for the standard two column layout.
pub fn int_row(id: i32, total: i32) -> Vec<Cell> {
    vec![Cell::I32(id), Cell::I32(total)]
}

/// Builds a change row in the change table layout: version, operation code and
/// commit time first, data columns after.
pub fn change_row(
    version: i64,
    operation: &str,
    commit_time: Option<DateTime<Utc>>,
    cells: Vec<Cell>,
) -> Vec<Cell> {
    let mut row = vec![
        Cell::I64(version),
        Cell::String(operation.to_string()),
        commit_time.map(Cell::Timestamp).unwrap_or(Cell::Null),
    ];
    row.extend(cells);

    row
}

/// Scripts the two statements a full read of `table` issues, in order: the
/// current version query and the row read itself.
pub fn script_full_read(
    connection: &MemoryConnection,
    table: &DiscoveredTableInfo,
    version: i64,
    rows: Vec<Vec<Cell>>,
) {
    connection.script_query(
        ScriptedQuery::returning(vec![vec![Cell::I64(version)]])
            .expecting_sql(MemorySource::current_version_sql(&table.table_id)),
    );
    connection.script_query(
        ScriptedQuery::returning(rows).expecting_sql(MemorySource::full_read_sql(&table.table_id)),
    );
}

/// Scripts the two statements a delta read resuming from `checkpoint` issues,
/// in order: the minimum valid version query and the change read itself.
pub fn script_delta_read(
    connection: &MemoryConnection,
    table: &DiscoveredTableInfo,
    checkpoint: i64,
    min_valid: i64,
    rows: Vec<Vec<Cell>>,
) {
    connection.script_query(
        ScriptedQuery::returning(vec![vec![Cell::I64(min_valid)]])
            .expecting_sql(MemorySource::min_valid_version_sql(&table.table_id)),
    );
    connection.script_query(ScriptedQuery::returning(rows).expecting_sql(
        MemorySource::delta_read_sql(&table.table_id, &Checkpoint::from(checkpoint)),
    ));
}
