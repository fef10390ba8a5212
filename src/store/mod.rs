//! Storage capabilities.
//!
//! The workflow services never talk to a database directly; they hold one
//! trait object per capability:
//!
//! - [`CatalogStore`]: product identity and item models
//! - [`DirectoryService`]: read-only person lookup
//! - [`SettingsStore`]: runtime flags
//! - [`AssetStore`]: asset rows and their ledger, with the row-level
//!   serialization tag minting and holder transitions need
//!
//! [`memory::MemoryStore`] and [`postgres::PgStore`] implement all four.

pub mod memory;
pub mod postgres;

use crate::error::StockError;
use crate::model::{
    parse_truthy, Asset, AssetId, AssetKey, AssetState, ItemModel, NewProduct, Person, Product,
    StockTransaction, TransactionType,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub trait CatalogStore: Send + Sync {
    fn find_product_by_code(&self, code: &str) -> Result<Option<Product>, StockError>;

    /// Insert a product; an existing code is a `Conflict`.
    fn create_product(&self, new: NewProduct) -> Result<Product, StockError>;

    /// Return the product with `new.code`, creating it from `new` if absent.
    /// The flag is `true` when a row was created.
    fn get_or_create_product(&self, new: NewProduct) -> Result<(Product, bool), StockError>;

    /// Products ordered by code, optionally filtered by a case-insensitive
    /// substring of code, name or type.
    fn list_products(&self, search: Option<&str>) -> Result<Vec<Product>, StockError>;

    fn list_item_models(&self) -> Result<Vec<ItemModel>, StockError>;

    fn create_item_model(&self, name: &str) -> Result<ItemModel, StockError>;
}

pub trait DirectoryService: Send + Sync {
    fn find_person(&self, id_number: &str) -> Result<Option<Person>, StockError>;

    /// People whose name contains `fragment`, ignoring case, ordered by name.
    fn search_people(&self, fragment: &str) -> Result<Vec<Person>, StockError>;
}

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StockError>;

    /// Upsert; last writer wins.
    fn set(&self, key: &str, value: &str) -> Result<(), StockError>;

    fn get_bool(&self, key: &str, default: bool) -> Result<bool, StockError> {
        Ok(self.get(key)?.map_or(default, |v| parse_truthy(&v)))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), StockError> {
        self.set(key, if value { "true" } else { "false" })
    }
}

/// Builds a tag from a product code and a 1-based sequence number.
pub type TagMinter<'a> = &'a dyn Fn(&str, u64) -> String;

/// Decides a ledger transition from the locked asset state. The steps are
/// applied in order; an empty list leaves the asset untouched.
pub type TransitionFn<'a> =
    &'a mut dyn FnMut(&AssetState) -> Result<Vec<HolderChange>, StockError>;

/// One step of a ledger decision: the holder after it and the entry it appends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderChange {
    pub holder_id: Option<String>,
    pub kind: TransactionType,
    pub remark: Option<String>,
}

pub trait AssetStore: Send + Sync {
    /// All assets ordered by id, product and holder resolved.
    fn list_assets(&self) -> Result<Vec<Asset>, StockError>;

    fn find_asset(&self, key: &AssetKey) -> Result<Option<Asset>, StockError>;

    /// Insert an asset for `product`. While holding the product's lock the
    /// store counts its assets and asks `mint` for tags starting at
    /// `count + 1`, moving on while a candidate is already taken.
    fn insert_asset(
        &self,
        product: &Product,
        holder_id: Option<&str>,
        mint: TagMinter<'_>,
    ) -> Result<Asset, StockError>;

    /// Delete the asset and its ledger entries. `false` if it did not exist.
    fn delete_asset(&self, id: AssetId) -> Result<bool, StockError>;

    /// Lock the asset with `tag`, let `decide` inspect it, then write the
    /// final holder and append one ledger entry per step as one unit. Every
    /// holder named by a step must exist. Nothing is written when `decide`
    /// or that check fails.
    fn apply_transition(
        &self,
        tag: &str,
        decide: TransitionFn<'_>,
    ) -> Result<(Asset, Vec<StockTransaction>), StockError>;

    /// Ledger entries for the asset, newest first.
    fn history(&self, asset_id: AssetId) -> Result<Vec<StockTransaction>, StockError>;

    fn check_health(&self) -> Result<bool, StockError>;
}

/// Every capability at once; what the application wires up.
pub trait Store: CatalogStore + DirectoryService + SettingsStore + AssetStore {}

impl<T> Store for T where T: CatalogStore + DirectoryService + SettingsStore + AssetStore {}
