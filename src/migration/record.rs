//! `MigrationRecord` - rows of the `stockroom_migrations` state table

use chrono::{DateTime, Utc};
use may_postgres::Row;

use crate::executor::DbError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,
    pub name: String,
    /// `SHA-256` checksum of the migration text when it was applied
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    /// Execution time in milliseconds (`None` if not recorded)
    pub execution_time_ms: Option<i64>,
    pub success: bool,
}

impl MigrationRecord {
    /// Expected column order: `version`, `name`, `checksum`, `applied_at`,
    /// `execution_time_ms`, `success`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::ParseError` if a column does not decode.
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        let parse = |e: may_postgres::Error| DbError::ParseError(format!("migration record: {e}"));
        Ok(Self {
            version: row.try_get(0).map_err(parse)?,
            name: row.try_get(1).map_err(parse)?,
            checksum: row.try_get(2).map_err(parse)?,
            applied_at: row.try_get(3).map_err(parse)?,
            execution_time_ms: row.try_get(4).map_err(parse)?,
            success: row.try_get(5).map_err(parse)?,
        })
    }
}
