use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::concurrency::flow::FlowHandle;
use crate::connection::base::{ConnectionPool, QueryRun, RowFn, SqlConnection};
use crate::error::{ErrorKind, ExportError, ExportResult};
use crate::export_error;
use crate::types::Cell;

/// Where a scripted failure surfaces relative to row delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePosition {
    /// The driver fails before any row is delivered.
    BeforeRows,
    /// All rows are delivered, then the driver reports the failure.
    AfterRows,
}

#[derive(Debug)]
struct ScriptedFailure {
    position: FailurePosition,
    error: ExportError,
}

/// One scripted response of a [`MemoryConnection`].
#[derive(Debug)]
pub struct ScriptedQuery {
    expected_sql: Option<String>,
    rows: Vec<Vec<Cell>>,
    rows_affected: Vec<u64>,
    failure: Option<ScriptedFailure>,
}

impl ScriptedQuery {
    /// A response that delivers the given rows and reports their count as affected.
    pub fn returning(rows: Vec<Vec<Cell>>) -> Self {
        let rows_affected = vec![rows.len() as u64];

        Self {
            expected_sql: None,
            rows,
            rows_affected,
            failure: None,
        }
    }

    /// A response that delivers no rows.
    pub fn empty() -> Self {
        Self::returning(Vec::new())
    }

    /// Fails the query unless it carries exactly this text.
    pub fn expecting_sql(mut self, sql: impl Into<String>) -> Self {
        self.expected_sql = Some(sql.into());
        self
    }

    pub fn with_rows_affected(mut self, rows_affected: Vec<u64>) -> Self {
        self.rows_affected = rows_affected;
        self
    }

    /// Reports `error` before any row is delivered.
    pub fn failing_before_rows(mut self, error: ExportError) -> Self {
        self.failure = Some(ScriptedFailure {
            position: FailurePosition::BeforeRows,
            error,
        });
        self
    }

    /// Delivers all rows, then reports `error`.
    pub fn failing_after_rows(mut self, error: ExportError) -> Self {
        self.failure = Some(ScriptedFailure {
            position: FailurePosition::AfterRows,
            error,
        });
        self
    }
}

#[derive(Debug, Default)]
struct ConnInner {
    script: VecDeque<ScriptedQuery>,
    executed_sql: Vec<String>,
    supports_flow_control: bool,
}

/// An in-memory connection that replays scripted query responses.
///
/// Each executed query consumes the next scripted response in order. The connection
/// records every executed statement, so tests can assert on the exact SQL the engine
/// produced. Clones share the same script and log.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    inner: Arc<Mutex<ConnInner>>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connection whose queries honor pause and resume requests.
    pub fn with_flow_control() -> Self {
        let connection = Self::new();
        lock_conn(&connection.inner).supports_flow_control = true;
        connection
    }

    /// Appends a scripted response to the queue.
    pub fn script_query(&self, query: ScriptedQuery) {
        lock_conn(&self.inner).script.push_back(query);
    }

    /// Returns the statements executed so far, in order.
    pub fn executed_sql(&self) -> Vec<String> {
        lock_conn(&self.inner).executed_sql.clone()
    }

    /// Returns how many scripted responses have not been consumed yet.
    pub fn remaining_scripted_queries(&self) -> usize {
        lock_conn(&self.inner).script.len()
    }
}

impl SqlConnection for MemoryConnection {
    async fn run_query(
        &mut self,
        sql: &str,
        flow: Option<&FlowHandle>,
        on_row: RowFn<'_>,
    ) -> QueryRun {
        let script = {
            let mut inner = lock_conn(&self.inner);
            inner.executed_sql.push(sql.to_string());
            inner.script.pop_front()
        };

        let Some(script) = script else {
            return QueryRun::failure(
                Vec::new(),
                export_error!(
                    ErrorKind::SourceQueryFailed,
                    "No scripted response left for query",
                    sql
                ),
            );
        };
        let ScriptedQuery {
            expected_sql,
            rows,
            rows_affected,
            failure,
        } = script;

        if let Some(expected_sql) = &expected_sql {
            if expected_sql != sql {
                return QueryRun::failure(
                    Vec::new(),
                    export_error!(
                        ErrorKind::SourceQueryFailed,
                        "Unexpected query text",
                        format!("expected `{expected_sql}`, got `{sql}`")
                    ),
                );
            }
        }

        let fails_before_rows = failure
            .as_ref()
            .is_some_and(|failure| failure.position == FailurePosition::BeforeRows);
        if fails_before_rows {
            return finish_run(rows_affected, failure);
        }

        for row in &rows {
            if let Some(flow) = flow {
                flow.wait_until_resumed().await;
            }
            if let Err(error) = on_row(row, flow) {
                return QueryRun::failure(rows_affected, error);
            }
        }

        finish_run(rows_affected, failure)
    }

    fn supports_flow_control(&self) -> bool {
        lock_conn(&self.inner).supports_flow_control
    }
}

#[derive(Debug)]
struct PoolInner {
    connections: Mutex<VecDeque<MemoryConnection>>,
    permits: Arc<Semaphore>,
    fail_acquisition: AtomicBool,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// An in-memory [`ConnectionPool`] over a fixed set of [`MemoryConnection`]s.
///
/// Acquisition waits until a connection is free, so at most as many guards exist as
/// connections were provided. Dropping a guard returns its connection to the pool.
#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    pub fn new(connections: Vec<MemoryConnection>) -> Self {
        let permits = Arc::new(Semaphore::new(connections.len()));

        Self {
            inner: Arc::new(PoolInner {
                connections: Mutex::new(connections.into()),
                permits,
                fail_acquisition: AtomicBool::new(false),
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }),
        }
    }

    /// Creates a pool holding a single connection.
    pub fn single(connection: MemoryConnection) -> Self {
        Self::new(vec![connection])
    }

    /// Makes every subsequent acquisition fail.
    pub fn fail_acquisitions(&self) {
        self.inner.fail_acquisition.store(true, Ordering::SeqCst);
    }

    /// Returns how many connections have been acquired so far.
    pub fn acquired_count(&self) -> usize {
        self.inner.acquired.load(Ordering::SeqCst)
    }

    /// Returns how many connections have been released so far.
    pub fn released_count(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }
}

impl ConnectionPool for MemoryPool {
    type Connection = MemoryConnection;
    type Guard = MemoryPooledConnection;

    async fn acquire(&self) -> ExportResult<MemoryPooledConnection> {
        if self.inner.fail_acquisition.load(Ordering::SeqCst) {
            return Err(export_error!(
                ErrorKind::ConnectionAcquisitionFailed,
                "Connection pool rejected the acquisition"
            ));
        }

        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| {
                export_error!(
                    ErrorKind::ConnectionAcquisitionFailed,
                    "Connection pool is closed",
                    err
                )
            })?;

        let connection = {
            let mut connections = lock_pool(&self.inner.connections);
            connections.pop_front()
        };
        let Some(connection) = connection else {
            return Err(export_error!(
                ErrorKind::ConnectionAcquisitionFailed,
                "Connection pool is exhausted"
            ));
        };

        self.inner.acquired.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryPooledConnection {
            connection,
            pool: self.inner.clone(),
            _permit: permit,
        })
    }
}

/// Scoped guard over an acquired [`MemoryConnection`].
///
/// Dropping the guard returns the connection to the pool and releases the slot, on
/// every exit path.
#[derive(Debug)]
pub struct MemoryPooledConnection {
    connection: MemoryConnection,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for MemoryPooledConnection {
    type Target = MemoryConnection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl DerefMut for MemoryPooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}

impl Drop for MemoryPooledConnection {
    fn drop(&mut self) {
        let connection = std::mem::take(&mut self.connection);
        lock_pool(&self.pool.connections).push_back(connection);
        self.pool.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock_conn(inner: &Mutex<ConnInner>) -> std::sync::MutexGuard<'_, ConnInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_pool(
    connections: &Mutex<VecDeque<MemoryConnection>>,
) -> std::sync::MutexGuard<'_, VecDeque<MemoryConnection>> {
    match connections.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn finish_run(rows_affected: Vec<u64>, failure: Option<ScriptedFailure>) -> QueryRun {
    match failure {
        Some(failure) => QueryRun::failure(rows_affected, failure.error),
        None => QueryRun::success(rows_affected),
    }
}
