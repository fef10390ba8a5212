//! In-process migration on application startup

use crate::executor::DbExecutor;
use crate::migration::lock::MigrationLockGuard;
use crate::migration::{initialize_state_table, MigrationError, Migrator};

/// Apply pending embedded migrations before serving.
///
/// The first instance to start takes the lock and migrates; others wait for
/// it (up to `timeout_seconds`, default 60) and then find nothing pending.
/// A modified applied migration aborts startup.
///
/// # Errors
///
/// Returns `MigrationError` on lock timeout, checksum mismatch or a failing
/// statement.
pub fn startup_migrations(
    executor: &dyn DbExecutor,
    timeout_seconds: Option<u64>,
) -> Result<usize, MigrationError> {
    initialize_state_table(executor)?;
    let lock = MigrationLockGuard::new(executor, timeout_seconds)?;

    let migrator = Migrator::embedded()?;
    let applied = migrator.up_with_lock(lock.executor(), None)?;

    if applied > 0 {
        log::info!("Applied {applied} migration(s) on startup");
    } else {
        log::debug!("No pending migrations to apply");
    }
    Ok(applied)
}
