//! Checksums of migration text

use sha2::{Digest, Sha256};

use super::MigrationError;

/// Hex SHA-256 of a migration's SQL.
pub fn calculate_checksum(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compare the stored checksum of an applied migration with the shipped one.
///
/// # Errors
///
/// Returns `MigrationError::ChecksumMismatch` when they differ.
pub fn validate_checksum(
    version: i64,
    name: &str,
    stored: &str,
    current: &str,
) -> Result<(), MigrationError> {
    if stored == current {
        Ok(())
    } else {
        Err(MigrationError::ChecksumMismatch {
            version,
            name: name.to_string(),
            stored: stored.to_string(),
            current: current.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable_hex() {
        let a = calculate_checksum("CREATE TABLE t (id INT);");
        assert_eq!(a.len(), 64);
        assert_eq!(a, calculate_checksum("CREATE TABLE t (id INT);"));
        assert_ne!(a, calculate_checksum("CREATE TABLE t (id BIGINT);"));
    }

    #[test]
    fn test_validate_checksum() {
        assert!(validate_checksum(1, "x", "abc", "abc").is_ok());
        let err = validate_checksum(1, "x", "abc", "abd").unwrap_err();
        assert!(matches!(err, MigrationError::ChecksumMismatch { version: 1, .. }));
    }
}
