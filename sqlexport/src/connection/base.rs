use std::future::Future;
use std::ops::DerefMut;

use crate::concurrency::flow::FlowHandle;
use crate::error::{ExportError, ExportResult};
use crate::types::Cell;

/// Callback invoked once per delivered row with the raw column values.
///
/// The second argument is the flow control handle of the running query, absent when
/// the connection cannot suspend delivery. Returning an error stops delivery and is
/// reported as the query's failure.
pub type RowFn<'a> = &'a mut (dyn FnMut(&[Cell], Option<&FlowHandle>) -> ExportResult<()> + Send);

/// Outcome of one streamed query.
///
/// Driver failures are carried as a value instead of an early return, so the caller
/// can run its completion callback and emit its end event before surfacing them.
#[derive(Debug)]
pub struct QueryRun {
    /// Rows affected counts reported by the driver, one entry per statement
    pub rows_affected: Vec<u64>,
    pub error: Option<ExportError>,
}

impl QueryRun {
    pub fn success(rows_affected: Vec<u64>) -> Self {
        Self {
            rows_affected,
            error: None,
        }
    }

    pub fn failure(rows_affected: Vec<u64>, error: ExportError) -> Self {
        Self {
            rows_affected,
            error: Some(error),
        }
    }
}

/// A single logical connection to a source database.
///
/// While a query runs, the connection is exclusively owned by that query; at most one
/// streaming query is ever in flight per connection.
pub trait SqlConnection: Send {
    /// Runs `sql`, delivering every result row to `on_row` in order.
    ///
    /// The driver forwards `flow` to each `on_row` invocation and suspends delivery
    /// between rows while it is paused. A failing `on_row` stops delivery, and its
    /// error becomes the query's captured failure.
    fn run_query(
        &mut self,
        sql: &str,
        flow: Option<&FlowHandle>,
        on_row: RowFn<'_>,
    ) -> impl Future<Output = QueryRun> + Send;

    /// Returns whether this connection can suspend row delivery on request.
    fn supports_flow_control(&self) -> bool;
}

/// Hands out a single logical connection for the duration of a scoped operation.
///
/// The guard returned by [`ConnectionPool::acquire`] releases the connection exactly
/// once when dropped, on success, error and cancellation paths alike. Acquisition
/// failures are fatal to the operation that requested the connection; the pool does
/// not retry internally.
pub trait ConnectionPool: Send + Sync {
    type Connection: SqlConnection;
    type Guard: DerefMut<Target = Self::Connection> + Send;

    /// Acquires a connection, waiting until one is available.
    fn acquire(&self) -> impl Future<Output = ExportResult<Self::Guard>> + Send;
}
