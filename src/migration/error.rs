//! Migration-specific error types

use crate::executor::DbError;

#[derive(Debug)]
pub enum MigrationError {
    /// Database execution error
    Database(DbError),
    /// Migration name or content is malformed
    InvalidFormat(String),
    /// An applied migration's text changed
    ChecksumMismatch {
        version: i64,
        name: String,
        stored: String,
        current: String,
    },
    /// Migration lock could not be taken in time
    LockTimeout(String),
    /// A statement of the migration failed
    ExecutionFailed {
        version: i64,
        name: String,
        error: String,
    },
    /// Recorded as applied, but not shipped in this build
    MissingFile { version: i64, name: String },
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Database(e) => write!(f, "Database error: {e}"),
            MigrationError::InvalidFormat(msg) => write!(f, "Invalid migration format: {msg}"),
            MigrationError::ChecksumMismatch {
                version,
                name,
                stored,
                current,
            } => write!(
                f,
                "Migration '{name}' (version {version}) has been modified after being applied.\n\
                 Stored checksum: {stored}\n\
                 Current checksum: {current}"
            ),
            MigrationError::LockTimeout(msg) => write!(
                f,
                "Migration lock timeout: {msg}\n\
                 Another process may be running migrations. If no migrator is running, \
                 remove the lock row from stockroom_migrations (version = -1)."
            ),
            MigrationError::ExecutionFailed {
                version,
                name,
                error,
            } => write!(
                f,
                "Migration '{name}' (version {version}) failed during execution: {error}"
            ),
            MigrationError::MissingFile { version, name } => write!(
                f,
                "Applied migration m{version}_{name}.sql is not part of this build"
            ),
        }
    }
}

impl std::error::Error for MigrationError {}

impl From<DbError> for MigrationError {
    fn from(error: DbError) -> Self {
        MigrationError::Database(error)
    }
}
