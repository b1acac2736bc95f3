use crate::concurrency::flow::FlowHandle;
use crate::connection::base::{RowFn, SqlConnection};
use crate::error::{ErrorKind, ExportError, ExportResult};
use crate::events::bus::EventBus;
use crate::export_error;
use crate::types::{Cell, ExportEvent, SqlExecutionEndedEvent, SqlExecutionStartedEvent};

/// Callback invoked once per query with the driver's rows affected counts.
pub type DoneFn<'a> = &'a mut (dyn FnMut(&[u64]) + Send);

/// Executes streamed queries against a connection, reporting each execution on the
/// event bus.
///
/// Every call emits a started event, streams the rows, invokes the completion
/// callback and emits an ended event. The completion callback runs even when the
/// query failed or produced no rows; the failure is surfaced only afterwards, so
/// callers can rely on their finalization having happened.
#[derive(Clone)]
pub struct QueryExecutor {
    bus: EventBus,
}

impl QueryExecutor {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Streams `sql`, delivering each row to `on_row`.
    ///
    /// When the connection supports flow control, a reference counted pause handle is
    /// created for the query and forwarded to `on_row`; otherwise the handle is
    /// absent and callers must not assume backpressure is honored.
    pub async fn execute<C: SqlConnection>(
        &self,
        connection: &mut C,
        sql: &str,
        on_row: RowFn<'_>,
        on_done: Option<DoneFn<'_>>,
    ) -> ExportResult<()> {
        let flow = connection.supports_flow_control().then(FlowHandle::new);

        self.bus
            .emit(ExportEvent::SqlExecutionStarted(SqlExecutionStartedEvent {
                sql: sql.to_string(),
            }));

        let run = connection.run_query(sql, flow.as_ref(), on_row).await;

        if let Some(on_done) = on_done {
            on_done(&run.rows_affected);
        }

        self.bus
            .emit(ExportEvent::SqlExecutionEnded(SqlExecutionEndedEvent {
                sql: sql.to_string(),
            }));

        match run.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Runs a statement, discarding any rows it produces.
    pub async fn execute_without_results<C: SqlConnection>(
        &self,
        connection: &mut C,
        sql: &str,
    ) -> ExportResult<()> {
        self.execute(connection, sql, &mut |_cells, _flow| Ok(()), None)
            .await
    }

    /// Runs a query expected to produce a value, returning the first column.
    ///
    /// Fails when the query produces no rows. With `strict` set, more than one row is
    /// a failure as well; otherwise the last row's value wins.
    pub async fn query_single_value<C: SqlConnection>(
        &self,
        connection: &mut C,
        sql: &str,
        strict: bool,
    ) -> ExportResult<Cell> {
        let mut value: Option<Cell> = None;

        self.execute(
            connection,
            sql,
            &mut |cells, _flow| {
                if strict && value.is_some() {
                    return Err(export_error!(
                        ErrorKind::QueryProducedTooManyRows,
                        "Expected exactly one row but got more."
                    ));
                }
                value = Some(cells.first().cloned().unwrap_or(Cell::Null));

                Ok(())
            },
            None,
        )
        .await?;

        match value {
            Some(value) => Ok(value),
            None => Err(export_error!(
                ErrorKind::QueryProducedNoRows,
                "Query produced no rows."
            )),
        }
    }

    /// Runs a query and buffers every row into a sequence.
    pub async fn query_all_rows<C: SqlConnection>(
        &self,
        connection: &mut C,
        sql: &str,
    ) -> ExportResult<Vec<Vec<Cell>>> {
        let mut rows = Vec::new();

        self.execute(
            connection,
            sql,
            &mut |cells, _flow| {
                rows.push(cells.to_vec());
                Ok(())
            },
            None,
        )
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::connection::memory::{MemoryConnection, ScriptedQuery};
    use crate::types::EventType;

    fn executor_with_event_log() -> (QueryExecutor, Arc<Mutex<Vec<EventType>>>) {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let log = log.clone();
            bus.on_any(move |event| {
                log.lock().unwrap().push(event.event_type());
            });
        }

        (QueryExecutor::new(bus), log)
    }

    #[tokio::test]
    async fn execution_events_bracket_the_query() {
        let (executor, log) = executor_with_event_log();
        let mut connection = MemoryConnection::new();
        connection.script_query(ScriptedQuery::returning(vec![vec![Cell::I64(1)]]));

        executor
            .execute(&mut connection, "SELECT 1", &mut |_cells, _flow| Ok(()), None)
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![EventType::SqlExecutionStarted, EventType::SqlExecutionEnded]
        );
    }

    #[tokio::test]
    async fn completion_callback_runs_before_failure_is_surfaced() {
        let (executor, log) = executor_with_event_log();
        let mut connection = MemoryConnection::new();
        connection.script_query(
            ScriptedQuery::returning(vec![vec![Cell::I64(1)]]).failing_after_rows(
                export_error!(ErrorKind::SourceQueryFailed, "Scripted failure"),
            ),
        );

        let mut done_counts: Option<Vec<u64>> = None;
        let err = executor
            .execute(
                &mut connection,
                "SELECT 1",
                &mut |_cells, _flow| Ok(()),
                Some(&mut |rows_affected: &[u64]| {
                    done_counts = Some(rows_affected.to_vec());
                }),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SourceQueryFailed);
        assert_eq!(done_counts, Some(vec![1]));
        assert_eq!(
            *log.lock().unwrap(),
            vec![EventType::SqlExecutionStarted, EventType::SqlExecutionEnded]
        );
    }

    #[tokio::test]
    async fn completion_callback_runs_for_empty_results() {
        let (executor, _log) = executor_with_event_log();
        let mut connection = MemoryConnection::new();
        connection.script_query(ScriptedQuery::empty());

        let mut done = false;
        executor
            .execute(
                &mut connection,
                "SELECT 1",
                &mut |_cells, _flow| Ok(()),
                Some(&mut |_rows_affected: &[u64]| {
                    done = true;
                }),
            )
            .await
            .unwrap();

        assert!(done);
    }

    #[tokio::test]
    async fn single_value_requires_at_least_one_row() {
        let (executor, _log) = executor_with_event_log();
        let mut connection = MemoryConnection::new();
        connection.script_query(ScriptedQuery::empty());

        let err = executor
            .query_single_value(&mut connection, "SELECT 1", false)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::QueryProducedNoRows);
    }

    #[tokio::test]
    async fn strict_single_value_rejects_extra_rows() {
        let (executor, _log) = executor_with_event_log();
        let mut connection = MemoryConnection::new();
        connection.script_query(ScriptedQuery::returning(vec![
            vec![Cell::I64(1)],
            vec![Cell::I64(2)],
        ]));

        let err = executor
            .query_single_value(&mut connection, "SELECT 1", true)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::QueryProducedTooManyRows);
    }

    #[tokio::test]
    async fn lenient_single_value_returns_the_last_row() {
        let (executor, _log) = executor_with_event_log();
        let mut connection = MemoryConnection::new();
        connection.script_query(ScriptedQuery::returning(vec![
            vec![Cell::I64(1)],
            vec![Cell::I64(2)],
        ]));

        let value = executor
            .query_single_value(&mut connection, "SELECT 1", false)
            .await
            .unwrap();

        assert_eq!(value, Cell::I64(2));
    }

    #[tokio::test]
    async fn buffered_query_collects_all_rows() {
        let (executor, _log) = executor_with_event_log();
        let row_id = uuid::Uuid::new_v4();
        let mut connection = MemoryConnection::new();
        connection.script_query(ScriptedQuery::returning(vec![
            vec![Cell::I64(1), Cell::Uuid(row_id)],
            vec![Cell::I64(2), Cell::String("b".to_string())],
        ]));

        let rows = executor
            .query_all_rows(&mut connection, "SELECT 1")
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], Cell::Uuid(row_id));
        assert_eq!(rows[1][0], Cell::I64(2));
    }
}
