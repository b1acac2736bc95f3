use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Names of the bookkeeping columns appended to every exported row.
///
/// In order: the time this export run started processing the table, the time the row
/// last changed, and the deletion time (null for rows that still exist).
pub const BOOKKEEPING_COLUMN_NAMES: [&str; 3] = ["__PROCESSED_AT", "__CHANGED_AT", "__DELETED_AT"];

/// Number of bookkeeping columns appended after the source columns of a row.
pub const BOOKKEEPING_COLUMN_COUNT: usize = BOOKKEEPING_COLUMN_NAMES.len();

/// A single value in an exported row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    String(String),
    I32(i32),
    I64(i64),
    F64(f64),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

/// The classification a source driver assigns to each delivered row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    /// The row exists in the source and all columns were delivered.
    Normal,
    /// The row was deleted in the source, so only key columns carry values.
    Deleted,
    /// The row failed shape validation and must not be forwarded to the sink.
    Invalid,
}

/// The reusable output buffer a source driver fills for each delivered row.
///
/// The buffer holds one slot per source column followed by
/// [`BOOKKEEPING_COLUMN_COUNT`] trailing slots which the export stamps before the row
/// is handed to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub values: Vec<Cell>,
}

impl OutputRow {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    /// Creates a null-filled buffer for a table with `column_count` source columns.
    pub fn for_column_count(column_count: usize) -> Self {
        Self {
            values: vec![Cell::Null; column_count + BOOKKEEPING_COLUMN_COUNT],
        }
    }

    /// Returns the number of source columns, excluding the bookkeeping slots.
    pub fn source_column_count(&self) -> usize {
        self.values.len() - BOOKKEEPING_COLUMN_COUNT
    }

    /// Stamps the trailing bookkeeping slots of the buffer.
    ///
    /// `deleted_at` is set to the change time for deleted rows and null otherwise.
    pub fn stamp_bookkeeping(
        &mut self,
        processed_at: DateTime<Utc>,
        changed_at: DateTime<Utc>,
        deleted_at: Option<DateTime<Utc>>,
    ) {
        let base = self.source_column_count();
        self.values[base] = Cell::Timestamp(processed_at);
        self.values[base + 1] = Cell::Timestamp(changed_at);
        self.values[base + 2] = match deleted_at {
            Some(deleted_at) => Cell::Timestamp(deleted_at),
            None => Cell::Null,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn buffer_reserves_bookkeeping_slots() {
        let row = OutputRow::for_column_count(2);

        assert_eq!(row.values.len(), 2 + BOOKKEEPING_COLUMN_COUNT);
        assert_eq!(row.source_column_count(), 2);
        assert!(row.values.iter().all(|cell| *cell == Cell::Null));
    }

    #[test]
    fn stamping_sets_deletion_time_only_for_deleted_rows() {
        let processed_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let changed_at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let mut row = OutputRow::for_column_count(1);
        row.stamp_bookkeeping(processed_at, changed_at, None);
        assert_eq!(row.values[1], Cell::Timestamp(processed_at));
        assert_eq!(row.values[2], Cell::Timestamp(changed_at));
        assert_eq!(row.values[3], Cell::Null);

        let mut row = OutputRow::for_column_count(1);
        row.stamp_bookkeeping(processed_at, changed_at, Some(changed_at));
        assert_eq!(row.values[3], Cell::Timestamp(changed_at));
    }
}
