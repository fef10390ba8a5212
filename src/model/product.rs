use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StockError;

pub type ProductId = i64;

/// Column widths of the catalog tables, in characters.
pub const PRODUCT_CODE_MAX_LEN: usize = 100;
pub const PRODUCT_NAME_MAX_LEN: usize = 255;
pub const PRODUCT_TYPE_MAX_LEN: usize = 100;
pub const ITEM_MODEL_NAME_MAX_LEN: usize = 255;

/// `Validation` error when `value` is longer than `max` characters.
pub fn check_len(field: &str, value: &str, max: usize) -> Result<(), StockError> {
    if value.chars().count() > max {
        return Err(StockError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Catalog definition that assets instantiate. `code` is unique and never
/// changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub product_type: String,
    pub price: Decimal,
}

/// Fields used when a product has to be created for an unseen code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    pub product_type: String,
    pub price: Decimal,
}

impl NewProduct {
    /// Reject values the catalog columns cannot hold.
    pub fn validate(&self) -> Result<(), StockError> {
        check_len("product code", &self.code, PRODUCT_CODE_MAX_LEN)?;
        check_len("name", &self.name, PRODUCT_NAME_MAX_LEN)?;
        check_len("type", &self.product_type, PRODUCT_TYPE_MAX_LEN)
    }

    pub fn into_product(self, id: ProductId) -> Product {
        Product {
            id,
            code: self.code,
            name: self.name,
            product_type: self.product_type,
            price: self.price,
        }
    }
}

/// Item category, used by reservations elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemModel {
    pub id: i64,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_product(code: &str, name: &str) -> NewProduct {
        NewProduct {
            code: code.to_string(),
            name: name.to_string(),
            product_type: String::new(),
            price: Decimal::ZERO,
        }
    }

    #[test]
    fn test_validate_counts_characters() {
        assert!(new_product(&"X".repeat(100), "ok").validate().is_ok());
        // 255 multi-byte characters still fit.
        assert!(new_product("SK", &"掃".repeat(255)).validate().is_ok());

        let err = new_product(&"X".repeat(101), "ok").validate().unwrap_err();
        assert_eq!(err.to_string(), "product code must be at most 100 characters");
        let err = new_product("SK", &"n".repeat(256)).validate().unwrap_err();
        assert!(matches!(err, StockError::Validation(_)));

        let mut typed = new_product("SK", "ok");
        typed.product_type = "t".repeat(101);
        assert!(typed.validate().is_err());
    }
}
