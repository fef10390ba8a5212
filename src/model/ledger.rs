use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::AssetId;

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Back into the warehouse.
    #[serde(rename = "IN")]
    In,
    /// Out to a person.
    #[serde(rename = "OUT")]
    Out,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::In => "IN",
            TransactionType::Out => "OUT",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised transaction type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransactionType(pub String);

impl FromStr for TransactionType {
    type Err = InvalidTransactionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(TransactionType::In),
            "OUT" => Ok(TransactionType::Out),
            other => Err(InvalidTransactionType(other.to_string())),
        }
    }
}

/// One append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: i64,
    #[serde(skip_serializing)]
    pub asset_id: AssetId,
    pub transaction_type: TransactionType,
    pub date: DateTime<Utc>,
    pub remark: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_sensitive() {
        assert_eq!("IN".parse::<TransactionType>(), Ok(TransactionType::In));
        assert_eq!("OUT".parse::<TransactionType>(), Ok(TransactionType::Out));
        assert!("out".parse::<TransactionType>().is_err());
        assert!("TRANSFER".parse::<TransactionType>().is_err());
    }

    #[test]
    fn test_serializes_as_wire_name() {
        let json = serde_json::to_string(&TransactionType::Out).unwrap();
        assert_eq!(json, "\"OUT\"");
    }
}
