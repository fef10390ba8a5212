//! Migrator - discovery, validation and execution of embedded migrations

use std::collections::HashSet;
use std::time::Instant;

use crate::executor::DbExecutor;
use crate::migration::lock::MigrationLockGuard;
use crate::migration::{
    embedded_migrations, initialize_state_table, validate_checksum, MigrationError, MigrationFile,
    MigrationRecord, MigrationStatus, PendingMigration,
};

pub struct Migrator {
    migrations: Vec<MigrationFile>,
}

impl Migrator {
    /// Migrator over the migrations embedded in this build.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidFormat` if an embedded name is malformed.
    pub fn embedded() -> Result<Self, MigrationError> {
        Ok(Self::new(embedded_migrations()?))
    }

    pub fn new(mut migrations: Vec<MigrationFile>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self { migrations }
    }

    pub fn migrations(&self) -> &[MigrationFile] {
        &self.migrations
    }

    /// Compare shipped migrations with the state table. Checksums of applied
    /// migrations are validated on the way.
    ///
    /// # Errors
    ///
    /// Returns `ChecksumMismatch` for a modified applied migration and
    /// `MissingFile` for an applied migration this build does not ship.
    pub fn status(&self, executor: &dyn DbExecutor) -> Result<MigrationStatus, MigrationError> {
        initialize_state_table(executor)?;
        let applied = Self::query_applied_migrations(executor)?;

        let shipped: HashSet<i64> = self.migrations.iter().map(|m| m.version).collect();
        if let Some(record) = applied.iter().find(|r| !shipped.contains(&r.version)) {
            return Err(MigrationError::MissingFile {
                version: record.version,
                name: record.name.clone(),
            });
        }

        let mut applied_records = Vec::new();
        let mut pending = Vec::new();
        for file in &self.migrations {
            match applied.iter().find(|r| r.version == file.version) {
                Some(record) => {
                    validate_checksum(file.version, &file.name, &record.checksum, &file.checksum)?;
                    applied_records.push(record.clone());
                }
                None => pending.push(PendingMigration {
                    version: file.version,
                    name: file.name.clone(),
                    checksum: file.checksum.clone(),
                }),
            }
        }
        Ok(MigrationStatus::new(applied_records, pending))
    }

    /// # Errors
    ///
    /// See [`Migrator::status`].
    pub fn validate_checksums(&self, executor: &dyn DbExecutor) -> Result<(), MigrationError> {
        self.status(executor).map(|_| ())
    }

    /// Take the lock and apply up to `steps` pending migrations (all if `None`).
    ///
    /// # Errors
    ///
    /// Returns the first lock, validation or execution failure.
    pub fn up(&self, executor: &dyn DbExecutor, steps: Option<usize>) -> Result<usize, MigrationError> {
        initialize_state_table(executor)?;
        let lock = MigrationLockGuard::new(executor, None)?;
        self.up_with_lock(lock.executor(), steps)
    }

    /// Apply pending migrations; the caller already holds the lock.
    ///
    /// # Errors
    ///
    /// Returns the first validation or execution failure. Migrations applied
    /// before the failure stay recorded.
    pub fn up_with_lock(
        &self,
        executor: &dyn DbExecutor,
        steps: Option<usize>,
    ) -> Result<usize, MigrationError> {
        let status = self.status(executor)?;
        let take = steps.unwrap_or(status.pending.len());

        let mut applied_count = 0;
        for pending in status.pending.iter().take(take) {
            let Some(file) = self.migrations.iter().find(|m| m.version == pending.version) else {
                continue;
            };

            let start = Instant::now();
            for statement in file.statements() {
                executor
                    .execute(&statement, &[])
                    .map_err(|e| MigrationError::ExecutionFailed {
                        version: file.version,
                        name: file.name.clone(),
                        error: e.to_string(),
                    })?;
            }
            let elapsed_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

            Self::record_migration(executor, file, elapsed_ms)?;
            log::info!(
                "applied migration m{}_{} in {elapsed_ms}ms",
                file.version,
                file.name
            );
            applied_count += 1;
        }
        Ok(applied_count)
    }

    fn query_applied_migrations(
        executor: &dyn DbExecutor,
    ) -> Result<Vec<MigrationRecord>, MigrationError> {
        let rows = executor.query_all(
            "SELECT version, name, checksum, applied_at, execution_time_ms, success \
             FROM stockroom_migrations WHERE version > 0 ORDER BY version ASC",
            &[],
        )?;
        rows.iter()
            .map(|row| MigrationRecord::from_row(row).map_err(MigrationError::from))
            .collect()
    }

    fn record_migration(
        executor: &dyn DbExecutor,
        file: &MigrationFile,
        execution_time_ms: i64,
    ) -> Result<(), MigrationError> {
        executor.execute(
            "INSERT INTO stockroom_migrations (version, name, checksum, applied_at, execution_time_ms, success) \
             VALUES ($1, $2, $3, NOW(), $4, true)",
            &[&file.version, &file.name, &file.checksum, &execution_time_ms],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_migrator_sorted() {
        let migrator = Migrator::embedded().unwrap();
        let versions: Vec<i64> = migrator.migrations().iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        assert_eq!(versions, sorted);
        assert!(!versions.is_empty());
    }
}
