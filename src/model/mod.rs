//! Domain records shared by the stores, the workflow services and the API.

mod asset;
mod ledger;
mod person;
mod product;
mod setting;

pub use asset::{Asset, AssetId, AssetKey, AssetState};
pub use ledger::{StockTransaction, TransactionType};
pub use person::Person;
pub use product::{
    check_len, ItemModel, NewProduct, Product, ProductId, ITEM_MODEL_NAME_MAX_LEN,
    PRODUCT_CODE_MAX_LEN, PRODUCT_NAME_MAX_LEN, PRODUCT_TYPE_MAX_LEN,
};
pub use setting::{parse_truthy, PRODUCT_DUPLICATE_CHECK};
