//! Embedded migration files

use regex::Regex;

use super::{calculate_checksum, MigrationError};

/// (file name, contents) for every shipped migration.
const EMBEDDED: &[(&str, &str)] = &[
    (
        "m20250301090000_create_stockroom_schema.sql",
        include_str!("../../migrations/m20250301090000_create_stockroom_schema.sql"),
    ),
    (
        "m20250301090100_create_system_settings.sql",
        include_str!("../../migrations/m20250301090100_create_system_settings.sql"),
    ),
    (
        "m20250301090200_widen_catalog_columns.sql",
        include_str!("../../migrations/m20250301090200_widen_catalog_columns.sql"),
    ),
];

/// A migration shipped with this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,
    pub name: String,
    pub sql: &'static str,
    /// SHA-256 of `sql`
    pub checksum: String,
}

impl MigrationFile {
    pub fn new(filename: &str, sql: &'static str) -> Result<Self, MigrationError> {
        let (version, name) = Self::parse_filename(filename)?;
        Ok(Self {
            version,
            name,
            sql,
            checksum: calculate_checksum(sql),
        })
    }

    /// Split `m{YYYYMMDDHHMMSS}_{name}.sql` into version and name.
    ///
    /// - `m20250301090000_create_stockroom_schema.sql` → (20250301090000, "create_stockroom_schema")
    pub fn parse_filename(filename: &str) -> Result<(i64, String), MigrationError> {
        let re = Regex::new(r"^m(\d{14})_([A-Za-z0-9_]+)\.sql$")
            .map_err(|e| MigrationError::InvalidFormat(format!("Invalid regex: {e}")))?;

        let caps = re.captures(filename).ok_or_else(|| {
            MigrationError::InvalidFormat(format!(
                "Migration file name '{filename}' does not match m{{YYYYMMDDHHMMSS}}_{{name}}.sql"
            ))
        })?;
        let version = caps[1]
            .parse::<i64>()
            .map_err(|e| MigrationError::InvalidFormat(format!("{filename}: {e}")))?;
        Ok((version, caps[2].to_string()))
    }

    /// The file's statements, comments stripped, in order.
    pub fn statements(&self) -> Vec<String> {
        split_statements(self.sql)
    }
}

/// Split SQL on `;`. Migration files keep to plain DDL/DML, so no statement
/// carries a semicolon inside a literal or a function body.
pub fn split_statements(sql: &str) -> Vec<String> {
    let without_comments: String = sql
        .lines()
        .map(|line| match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Every embedded migration, oldest first.
///
/// # Errors
///
/// Returns `MigrationError::InvalidFormat` on a malformed name or a
/// duplicated version.
pub fn embedded_migrations() -> Result<Vec<MigrationFile>, MigrationError> {
    let mut migrations = EMBEDDED
        .iter()
        .map(|(filename, sql)| MigrationFile::new(filename, sql))
        .collect::<Result<Vec<_>, _>>()?;
    migrations.sort_by_key(|m| m.version);

    if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(MigrationError::InvalidFormat(format!(
            "duplicate migration version {}",
            pair[0].version
        )));
    }
    Ok(migrations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filename() {
        let (version, name) =
            MigrationFile::parse_filename("m20250301090000_create_stockroom_schema.sql").unwrap();
        assert_eq!(version, 20250301090000);
        assert_eq!(name, "create_stockroom_schema");

        assert!(MigrationFile::parse_filename("m2025_short.sql").is_err());
        assert!(MigrationFile::parse_filename("m20250301090000_x.rs").is_err());
    }

    #[test]
    fn test_split_statements_drops_comments() {
        let sql = "-- header; with semicolon\nCREATE TABLE a (id INT);\n\nCREATE INDEX i ON a (id); -- trailing\n";
        let statements = split_statements(sql);
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a (id)"]
        );
    }

    #[test]
    fn test_embedded_migrations_are_ordered() {
        let migrations = embedded_migrations().unwrap();
        assert_eq!(migrations.len(), 3);
        assert!(migrations
            .windows(2)
            .all(|pair| pair[0].version < pair[1].version));
        assert!(migrations[0]
            .statements()
            .iter()
            .any(|s| s.contains("CREATE TABLE IF NOT EXISTS stock_transactions")));
        assert!(migrations[1]
            .statements()
            .iter()
            .any(|s| s.contains("ENABLE_PRODUCT_DUPLICATE_CHECK")));
        let widened = migrations[2].statements();
        assert_eq!(widened.len(), 5);
        assert!(widened
            .iter()
            .any(|s| s.contains("ALTER COLUMN code TYPE VARCHAR(100)")));
    }
}
