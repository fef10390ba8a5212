//! Transactions
//!
//! A [`Transaction`] owns a clone of a pooled client between `BEGIN` and
//! `COMMIT`. Row locks taken inside it (`SELECT ... FOR UPDATE`) are what
//! serialize tag minting per product and ledger transitions per asset in the
//! PostgreSQL store. There is no explicit rollback: every early return out of
//! a store operation drops the transaction, and dropping rolls back.

use crate::executor::{instrumented, DbError, DbExecutor, FailureFlag};
use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

#[derive(Debug)]
pub enum TransactionError {
    /// `BEGIN` or `COMMIT` failed on the server.
    PostgresError(PostgresError),
    /// The transaction was already committed.
    Closed,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            TransactionError::Closed => f.write_str("transaction already committed"),
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<PostgresError> for TransactionError {
    fn from(err: PostgresError) -> Self {
        TransactionError::PostgresError(err)
    }
}

impl From<TransactionError> for DbError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::PostgresError(e) => DbError::PostgresError(e),
            TransactionError::Closed => DbError::Other(err.to_string()),
        }
    }
}

pub struct Transaction {
    client: Client,
    failure: FailureFlag,
    committed: bool,
}

impl Transaction {
    pub(crate) fn begin(client: Client, failure: FailureFlag) -> Result<Self, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        if let Err(e) = client.execute("BEGIN", &[]) {
            if e.code().is_none() {
                failure.mark();
            }
            return Err(e.into());
        }
        Ok(Self {
            client,
            failure,
            committed: false,
        })
    }

    /// # Errors
    ///
    /// Returns an error if `COMMIT` fails; the server has then rolled back.
    pub fn commit(mut self) -> Result<(), TransactionError> {
        if self.committed {
            return Err(TransactionError::Closed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        // Set before COMMIT so a failed commit is not followed by a ROLLBACK.
        self.committed = true;
        if let Err(e) = self.client.execute("COMMIT", &[]) {
            if e.code().is_none() {
                self.failure.mark();
            }
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.committed {
            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::rollback_transaction_span().entered();

            log::debug!("rolling back uncommitted transaction");
            if let Err(e) = self.client.execute("ROLLBACK", &[]) {
                log::warn!("rollback failed: {e}");
                // The connection may still hold the open transaction.
                self.failure.mark();
            }
        }
    }
}

impl DbExecutor for Transaction {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_error_maps_to_db_error() {
        assert_eq!(
            TransactionError::Closed.to_string(),
            "transaction already committed"
        );
        let db_err: DbError = TransactionError::Closed.into();
        assert_eq!(db_err.to_string(), "Execution error: transaction already committed");
    }
}
