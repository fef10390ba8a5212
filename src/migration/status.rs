//! Migration status tracking

use crate::migration::MigrationRecord;

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Applied migrations, from the state table
    pub applied: Vec<MigrationRecord>,
    /// Shipped migrations not applied yet, oldest first
    pub pending: Vec<PendingMigration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
}

impl MigrationStatus {
    #[must_use]
    pub fn new(applied: Vec<MigrationRecord>, pending: Vec<PendingMigration>) -> Self {
        Self { applied, pending }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.applied.len() + self.pending.len()
    }

    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn latest_applied_version(&self) -> Option<i64> {
        self.applied.iter().map(|m| m.version).max()
    }

    #[must_use]
    pub fn next_pending_version(&self) -> Option<i64> {
        self.pending.first().map(|m| m.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_status_summary() {
        let applied = vec![MigrationRecord {
            version: 20250301090000,
            name: "create_stockroom_schema".to_string(),
            checksum: "a".repeat(64),
            applied_at: Utc::now(),
            execution_time_ms: Some(12),
            success: true,
        }];
        let pending = vec![PendingMigration {
            version: 20250301090100,
            name: "create_system_settings".to_string(),
            checksum: "b".repeat(64),
        }];
        let status = MigrationStatus::new(applied, pending);
        assert_eq!(status.total(), 2);
        assert!(!status.is_up_to_date());
        assert_eq!(status.latest_applied_version(), Some(20250301090000));
        assert_eq!(status.next_pending_version(), Some(20250301090100));
    }
}
