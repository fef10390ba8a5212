//! Migration state table management

use crate::executor::{DbError, DbExecutor};

pub const STATE_TABLE: &str = "stockroom_migrations";

/// Create `stockroom_migrations` and its index if they do not exist.
///
/// # Errors
///
/// Returns `DbError` if the DDL fails.
pub fn initialize_state_table(executor: &dyn DbExecutor) -> Result<(), DbError> {
    executor.execute(
        "CREATE TABLE IF NOT EXISTS stockroom_migrations (
            version BIGINT PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            checksum VARCHAR(64) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            execution_time_ms BIGINT,
            success BOOLEAN NOT NULL DEFAULT true
        )",
        &[],
    )?;
    executor.execute(
        "CREATE INDEX IF NOT EXISTS idx_stockroom_migrations_applied_at \
         ON stockroom_migrations (applied_at)",
        &[],
    )?;
    Ok(())
}
