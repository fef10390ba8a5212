//! Flyway-style migration lock: a reserved row in the state table.

use std::time::{Duration, Instant};

use crate::executor::DbExecutor;
use crate::migration::MigrationError;

/// Version of the lock row. Real migrations use positive timestamps.
pub const LOCK_VERSION: i64 = -1;

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Holds the migration lock; releases it on drop.
pub struct MigrationLockGuard<'a> {
    executor: &'a dyn DbExecutor,
}

impl<'a> MigrationLockGuard<'a> {
    /// Take the lock, polling until `timeout_seconds` (default 60) elapses.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if the lock stays held, or
    /// `MigrationError::Database` if the insert itself fails.
    pub fn new(
        executor: &'a dyn DbExecutor,
        timeout_seconds: Option<u64>,
    ) -> Result<Self, MigrationError> {
        acquire_migration_lock(executor, timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))?;
        Ok(Self { executor })
    }

    pub fn executor(&self) -> &'a dyn DbExecutor {
        self.executor
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = release_migration_lock(self.executor) {
            log::error!("failed to release migration lock: {e}");
        }
    }
}

/// Insert the lock row; whoever inserts it holds the lock.
///
/// # Errors
///
/// Returns `MigrationError::LockTimeout` after `timeout_seconds`.
pub fn acquire_migration_lock(
    executor: &dyn DbExecutor,
    timeout_seconds: u64,
) -> Result<(), MigrationError> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_seconds);

    loop {
        if start.elapsed() >= timeout {
            return Err(MigrationError::LockTimeout(format!(
                "could not acquire the migration lock within {timeout_seconds} seconds"
            )));
        }

        let inserted = executor.execute(
            "INSERT INTO stockroom_migrations (version, name, checksum, applied_at, success) \
             VALUES ($1, 'LOCK', 'lock', NOW(), true) \
             ON CONFLICT (version) DO NOTHING",
            &[&LOCK_VERSION],
        )?;
        if inserted > 0 {
            log::debug!("migration lock acquired");
            return Ok(());
        }

        std::thread::sleep(RETRY_INTERVAL);
    }
}

/// # Errors
///
/// Returns `MigrationError::Database` if the delete fails.
pub fn release_migration_lock(executor: &dyn DbExecutor) -> Result<(), MigrationError> {
    executor.execute(
        "DELETE FROM stockroom_migrations WHERE version = $1",
        &[&LOCK_VERSION],
    )?;
    Ok(())
}

/// # Errors
///
/// Returns `MigrationError::Database` if the query fails.
pub fn is_migration_lock_held(executor: &dyn DbExecutor) -> Result<bool, MigrationError> {
    let row = executor.query_opt(
        "SELECT 1 FROM stockroom_migrations WHERE version = $1",
        &[&LOCK_VERSION],
    )?;
    Ok(row.is_some())
}
