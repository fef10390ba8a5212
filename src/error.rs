//! Domain error taxonomy.
//!
//! Every workflow operation returns [`StockError`]. The API layer maps each
//! variant to one HTTP status via [`StockError::status_code`].

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::executor::DbError;
use crate::model::Person;

/// The fields of an intake entry that could not be completed, echoed back so
/// the caller can resubmit with a disambiguated owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAsset {
    pub product_code: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub product_type: String,
    pub price: Decimal,
}

/// An owner name that matched more than one person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousOwner {
    pub owner_name: String,
    pub candidates: Vec<Person>,
    pub asset_data: PendingAsset,
}

#[derive(Debug)]
pub enum StockError {
    /// Missing or malformed input; resubmitting unchanged will fail again.
    Validation(String),
    /// A referenced record does not exist.
    NotFound(String),
    /// State-machine precondition or unique key violated.
    Conflict(String),
    /// Owner resolution found several people.
    AmbiguousOwner(Box<AmbiguousOwner>),
    /// Database or pool failure.
    Storage(DbError),
}

impl StockError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StockError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        StockError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        StockError::Conflict(msg.into())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            StockError::Validation(_) => 400,
            StockError::NotFound(_) => 404,
            StockError::Conflict(_) | StockError::AmbiguousOwner(_) => 409,
            StockError::Storage(_) => 500,
        }
    }

    /// Short machine-readable kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StockError::Validation(_) => "validation",
            StockError::NotFound(_) => "not_found",
            StockError::Conflict(_) => "conflict",
            StockError::AmbiguousOwner(_) => "ambiguous_owner",
            StockError::Storage(_) => "storage",
        }
    }
}

impl fmt::Display for StockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockError::Validation(msg) | StockError::NotFound(msg) | StockError::Conflict(msg) => {
                f.write_str(msg)
            }
            StockError::AmbiguousOwner(amb) => write!(
                f,
                "owner name '{}' matches {} people",
                amb.owner_name,
                amb.candidates.len()
            ),
            StockError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for StockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StockError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DbError> for StockError {
    fn from(err: DbError) -> Self {
        if err.is_unique_violation() {
            return StockError::Conflict(format!("duplicate key: {err}"));
        }
        StockError::Storage(err)
    }
}

impl From<crate::transaction::TransactionError> for StockError {
    fn from(err: crate::transaction::TransactionError) -> Self {
        StockError::from(DbError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(StockError::validation("x").status_code(), 400);
        assert_eq!(StockError::not_found("x").status_code(), 404);
        assert_eq!(StockError::conflict("x").status_code(), 409);
        assert_eq!(
            StockError::Storage(DbError::Other("down".to_string())).status_code(),
            500
        );
    }

    #[test]
    fn test_ambiguous_owner_display() {
        let err = StockError::AmbiguousOwner(Box::new(AmbiguousOwner {
            owner_name: "May".to_string(),
            candidates: vec![],
            asset_data: PendingAsset {
                product_code: "SK".to_string(),
                name: None,
                product_type: String::new(),
                price: Decimal::ZERO,
            },
        }));
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.to_string(), "owner name 'May' matches 0 people");
    }
}
