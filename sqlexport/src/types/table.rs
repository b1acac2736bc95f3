use std::cmp::Ordering;
use std::fmt;

/// A fully qualified table identifier consisting of a database, schema and table name.
///
/// This type represents the identity of a table as exposed by a source database. It is
/// used as the key for checkpoint storage and for all per-table events, so two exports
/// of the same table always agree on the identifier.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TableId {
    /// The database containing the schema
    pub database: String,
    /// The schema containing the table
    pub schema: String,
    /// The name of the table within the schema
    pub name: String,
}

impl TableId {
    pub fn new(database: String, schema: String, name: String) -> TableId {
        Self {
            database,
            schema,
            name,
        }
    }

    /// Returns the schema-qualified part of the identifier without the database.
    pub fn schema_qualified_name(&self) -> String {
        format!("[{0}].[{1}]", self.schema, self.name)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "[{0}].[{1}].[{2}]",
            self.database, self.schema, self.name
        ))
    }
}

impl PartialOrd for TableId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TableId {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.database, &self.schema, &self.name).cmp(&(
            &other.database,
            &other.schema,
            &other.name,
        ))
    }
}

/// Represents the column layout and change tracking status of a single table.
///
/// Columns are ordered with primary key columns first, so `primary_key_column_count`
/// is both the number of key columns and the index of the first non-key column.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TableMetadata {
    /// The names of all columns, primary key columns first
    pub column_names: Vec<String>,
    /// The source type name of each column, parallel to `column_names`
    pub column_types: Vec<String>,
    /// How many leading columns form the primary key
    pub primary_key_column_count: usize,
    /// Whether change tracking is enabled for the table
    pub change_tracking_enabled: bool,
}

impl TableMetadata {
    pub fn new(
        column_names: Vec<String>,
        column_types: Vec<String>,
        primary_key_column_count: usize,
        change_tracking_enabled: bool,
    ) -> Self {
        Self {
            column_names,
            column_types,
            primary_key_column_count,
            change_tracking_enabled,
        }
    }

    /// Returns the number of columns in the table, excluding bookkeeping columns.
    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    /// Returns whether every column of the table is part of the primary key.
    pub fn all_columns_are_keys(&self) -> bool {
        self.primary_key_column_count == self.column_names.len()
    }
}
