//! Database executor
//!
//! [`DbExecutor`] abstracts statement execution over `may_postgres` so the
//! PostgreSQL store, the migrator and transactions share one calling
//! convention. Every call is timed and counted when the `metrics` feature is on.

use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Executor error type
#[derive(Debug)]
pub enum DbError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// Query returned an unexpected shape (no rows, too many rows)
    QueryError(String),
    /// Row decoding failed
    ParseError(String),
    /// Pool exhaustion, poisoned state and similar
    Other(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            DbError::QueryError(s) => write!(f, "Query error: {s}"),
            DbError::ParseError(s) => write!(f, "Parse error: {s}"),
            DbError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<PostgresError> for DbError {
    fn from(err: PostgresError) -> Self {
        DbError::PostgresError(err)
    }
}

impl DbError {
    /// SQLSTATE of the underlying server error, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            DbError::PostgresError(e) => e.code().map(|c| c.code()),
            _ => None,
        }
    }

    /// `23505`: a unique constraint rejected the write.
    pub fn is_unique_violation(&self) -> bool {
        self.sql_state() == Some("23505")
    }

    /// A client error the server did not answer with a SQLSTATE: I/O,
    /// a closed socket, a protocol failure. The connection may be dead.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, DbError::PostgresError(e) if e.code().is_none())
    }
}

/// Set once a call on a connection fails in a way that may have broken it.
/// Shared between a pooled executor and the transactions it starts, and
/// read by the pool when the connection is returned.
#[derive(Debug, Clone, Default)]
pub(crate) struct FailureFlag(Arc<AtomicBool>);

impl FailureFlag {
    pub(crate) fn track<T>(&self, result: Result<T, DbError>) -> Result<T, DbError> {
        if let Err(e) = &result {
            if e.is_connection_failure() {
                self.0.store(true, Ordering::Relaxed);
            }
        }
        result
    }

    pub(crate) fn mark(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Trait for executing database operations
///
/// Implemented by [`PgExecutor`] (a bare client) and
/// [`Transaction`](crate::transaction::Transaction), so store code can run the
/// same statements inside or outside a transaction.
pub trait DbExecutor {
    /// Execute a statement and return the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError>;

    /// Execute a query that must return exactly one row.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails or does not return exactly one row.
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError>;

    /// Execute a query and return all rows.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError>;

    /// Execute a query and return the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the query fails.
    fn query_opt(
        &self,
        query: &str,
        params: &[&dyn ToSql],
    ) -> Result<Option<Row>, DbError> {
        Ok(self.query_all(query, params)?.into_iter().next())
    }
}

/// Run one client call with the shared timing/metrics/tracing envelope.
pub(crate) fn instrumented<T>(
    query: &str,
    call: impl FnOnce() -> Result<T, PostgresError>,
) -> Result<T, DbError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_query_span(query).entered();
    #[cfg(not(feature = "tracing"))]
    let _ = query;

    let start = Instant::now();
    let result = call().map_err(|e| {
        #[cfg(feature = "metrics")]
        METRICS.record_query_error();
        log::debug!("query failed: {e}");
        DbError::PostgresError(e)
    });

    let duration = start.elapsed();
    #[cfg(feature = "metrics")]
    METRICS.record_query_duration(duration);
    #[cfg(not(feature = "metrics"))]
    let _ = duration;

    result
}

/// `DbExecutor` over a single `may_postgres::Client`.
pub struct PgExecutor {
    client: Client,
    failure: FailureFlag,
}

impl PgExecutor {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            failure: FailureFlag::default(),
        }
    }

    /// Whether a call since the last health check failed at the connection level.
    pub fn needs_health_check(&self) -> bool {
        self.failure.is_set()
    }

    pub(crate) fn mark_healthy(&self) {
        self.failure.clear();
    }

    /// Start a transaction on this connection.
    ///
    /// The transaction must be committed or rolled back before the executor
    /// is used again; dropping it uncommitted rolls it back.
    ///
    /// # Errors
    ///
    /// Returns `TransactionError` if `BEGIN` fails.
    pub fn begin(
        &self,
    ) -> Result<crate::transaction::Transaction, crate::transaction::TransactionError> {
        crate::transaction::Transaction::begin(self.client.clone(), self.failure.clone())
    }

    /// `SELECT 1` round trip.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the health query itself cannot be issued.
    pub fn check_health(&self) -> Result<bool, DbError> {
        let result = crate::connection::check_connection_health(&self.client)
            .map_err(|e| DbError::Other(format!("Health check error: {e}")));
        if !matches!(result, Ok(true)) {
            self.failure.mark();
        }
        result
    }
}

impl DbExecutor for PgExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        self.failure
            .track(instrumented(query, || self.client.execute(query, params)))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        self.failure
            .track(instrumented(query, || self.client.query_one(query, params)))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        self.failure
            .track(instrumented(query, || self.client.query(query, params)))
    }
}
