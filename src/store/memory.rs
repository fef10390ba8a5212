//! In-process store.
//!
//! One mutex guards the whole state, which trivially gives the per-product
//! and per-asset serialization the workflow needs. Used by tests and by the
//! `memory` server backend.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{AssetStore, CatalogStore, DirectoryService, HolderChange, SettingsStore, TagMinter, TransitionFn};
use crate::error::StockError;
use crate::executor::DbError;
use crate::model::{
    Asset, AssetId, AssetKey, AssetState, ItemModel, NewProduct, Person, Product, ProductId,
    StockTransaction,
};

#[derive(Debug, Clone)]
struct AssetRow {
    id: AssetId,
    tag: String,
    product_id: ProductId,
    holder_id: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    products: BTreeMap<ProductId, Product>,
    item_models: Vec<ItemModel>,
    people: BTreeMap<String, Person>,
    assets: BTreeMap<AssetId, AssetRow>,
    ledger: Vec<StockTransaction>,
    settings: HashMap<String, String>,
    next_product_id: i64,
    next_item_model_id: i64,
    next_asset_id: i64,
    next_entry_id: i64,
}

impl MemoryState {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn product_by_code(&self, code: &str) -> Option<&Product> {
        self.products.values().find(|p| p.code == code)
    }

    fn resolve(&self, row: &AssetRow) -> Result<Asset, StockError> {
        let product = self.products.get(&row.product_id).cloned().ok_or_else(|| {
            StockError::Storage(DbError::Other(format!(
                "asset {} references missing product {}",
                row.tag, row.product_id
            )))
        })?;
        let holder = row
            .holder_id
            .as_ref()
            .and_then(|id| self.people.get(id))
            .cloned();
        Ok(Asset {
            id: row.id,
            tag: row.tag.clone(),
            product,
            holder,
        })
    }

    fn row_by_key(&self, key: &AssetKey) -> Option<&AssetRow> {
        match key {
            AssetKey::Id(id) => self.assets.get(id),
            AssetKey::Tag(tag) => self.assets.values().find(|a| &a.tag == tag),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with directory entries.
    pub fn with_people(people: impl IntoIterator<Item = Person>) -> Self {
        let store = Self::new();
        for person in people {
            // A fresh mutex cannot be poisoned.
            let _ = store.add_person(person);
        }
        store
    }

    /// Insert or replace a directory entry.
    pub fn add_person(&self, person: Person) -> Result<(), StockError> {
        self.lock()?.people.insert(person.id_number.clone(), person);
        Ok(())
    }

    /// Number of products; lets tests observe rows created by intake.
    pub fn product_count(&self) -> Result<usize, StockError> {
        Ok(self.lock()?.products.len())
    }

    /// Ledger rows across all assets, including ones whose asset is gone.
    pub fn ledger_len(&self) -> Result<usize, StockError> {
        Ok(self.lock()?.ledger.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StockError> {
        self.state
            .lock()
            .map_err(|_| StockError::Storage(DbError::Other("memory store poisoned".to_string())))
    }
}

impl CatalogStore for MemoryStore {
    fn find_product_by_code(&self, code: &str) -> Result<Option<Product>, StockError> {
        Ok(self.lock()?.product_by_code(code).cloned())
    }

    fn create_product(&self, new: NewProduct) -> Result<Product, StockError> {
        let mut state = self.lock()?;
        if state.product_by_code(&new.code).is_some() {
            return Err(StockError::conflict(format!(
                "product code '{}' already exists",
                new.code
            )));
        }
        let id = MemoryState::next_id(&mut state.next_product_id);
        let product = new.into_product(id);
        state.products.insert(id, product.clone());
        Ok(product)
    }

    fn get_or_create_product(&self, new: NewProduct) -> Result<(Product, bool), StockError> {
        let mut state = self.lock()?;
        if let Some(existing) = state.product_by_code(&new.code) {
            return Ok((existing.clone(), false));
        }
        let id = MemoryState::next_id(&mut state.next_product_id);
        let product = new.into_product(id);
        state.products.insert(id, product.clone());
        Ok((product, true))
    }

    fn list_products(&self, search: Option<&str>) -> Result<Vec<Product>, StockError> {
        let state = self.lock()?;
        let needle = search.map(str::to_lowercase);
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| match &needle {
                Some(n) => [&p.code, &p.name, &p.product_type]
                    .iter()
                    .any(|f| f.to_lowercase().contains(n.as_str())),
                None => true,
            })
            .cloned()
            .collect();
        products.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(products)
    }

    fn list_item_models(&self) -> Result<Vec<ItemModel>, StockError> {
        Ok(self.lock()?.item_models.clone())
    }

    fn create_item_model(&self, name: &str) -> Result<ItemModel, StockError> {
        let mut state = self.lock()?;
        let id = MemoryState::next_id(&mut state.next_item_model_id);
        let model = ItemModel {
            id,
            name: name.to_string(),
        };
        state.item_models.push(model.clone());
        Ok(model)
    }
}

impl DirectoryService for MemoryStore {
    fn find_person(&self, id_number: &str) -> Result<Option<Person>, StockError> {
        Ok(self.lock()?.people.get(id_number).cloned())
    }

    fn search_people(&self, fragment: &str) -> Result<Vec<Person>, StockError> {
        let state = self.lock()?;
        let mut matches: Vec<Person> = state
            .people
            .values()
            .filter(|p| p.name_contains(fragment))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name).then(a.id_number.cmp(&b.id_number)));
        Ok(matches)
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StockError> {
        Ok(self.lock()?.settings.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StockError> {
        self.lock()?
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl AssetStore for MemoryStore {
    fn list_assets(&self) -> Result<Vec<Asset>, StockError> {
        let state = self.lock()?;
        state.assets.values().map(|row| state.resolve(row)).collect()
    }

    fn find_asset(&self, key: &AssetKey) -> Result<Option<Asset>, StockError> {
        let state = self.lock()?;
        state.row_by_key(key).map(|row| state.resolve(row)).transpose()
    }

    fn insert_asset(
        &self,
        product: &Product,
        holder_id: Option<&str>,
        mint: TagMinter<'_>,
    ) -> Result<Asset, StockError> {
        let mut state = self.lock()?;
        if !state.products.contains_key(&product.id) {
            return Err(StockError::validation(format!(
                "product '{}' does not exist",
                product.code
            )));
        }
        if let Some(holder) = holder_id {
            if !state.people.contains_key(holder) {
                return Err(StockError::not_found("person does not exist"));
            }
        }

        let existing = state
            .assets
            .values()
            .filter(|a| a.product_id == product.id)
            .count() as u64;
        let mut sequence = existing + 1;
        let mut tag = mint(&product.code, sequence);
        while state.assets.values().any(|a| a.tag == tag) {
            sequence += 1;
            tag = mint(&product.code, sequence);
        }

        let id = MemoryState::next_id(&mut state.next_asset_id);
        let row = AssetRow {
            id,
            tag,
            product_id: product.id,
            holder_id: holder_id.map(str::to_string),
        };
        state.assets.insert(id, row.clone());
        state.resolve(&row)
    }

    fn delete_asset(&self, id: AssetId) -> Result<bool, StockError> {
        let mut state = self.lock()?;
        if state.assets.remove(&id).is_none() {
            return Ok(false);
        }
        state.ledger.retain(|entry| entry.asset_id != id);
        Ok(true)
    }

    fn apply_transition(
        &self,
        tag: &str,
        decide: TransitionFn<'_>,
    ) -> Result<(Asset, Vec<StockTransaction>), StockError> {
        let mut state = self.lock()?;
        let row = state
            .row_by_key(&AssetKey::Tag(tag.to_string()))
            .cloned()
            .ok_or_else(|| StockError::not_found(format!("asset '{tag}' does not exist")))?;

        let current = AssetState {
            id: row.id,
            tag: row.tag.clone(),
            holder_id: row.holder_id.clone(),
        };
        let steps = decide(&current)?;
        let Some(last) = steps.last() else {
            return Ok((state.resolve(&row)?, Vec::new()));
        };

        for holder in steps.iter().filter_map(|step| step.holder_id.as_ref()) {
            if !state.people.contains_key(holder) {
                return Err(StockError::not_found("person does not exist"));
            }
        }

        let final_holder = last.holder_id.clone();
        let now = Utc::now();
        let mut entries = Vec::with_capacity(steps.len());
        for HolderChange { kind, remark, .. } in steps {
            entries.push(StockTransaction {
                id: MemoryState::next_id(&mut state.next_entry_id),
                asset_id: row.id,
                transaction_type: kind,
                date: now,
                remark,
            });
        }

        let updated = {
            let stored = state.assets.get_mut(&row.id).ok_or_else(|| {
                StockError::not_found(format!("asset '{tag}' does not exist"))
            })?;
            stored.holder_id = final_holder;
            stored.clone()
        };
        state.ledger.extend(entries.iter().cloned());
        let asset = state.resolve(&updated)?;
        Ok((asset, entries))
    }

    fn history(&self, asset_id: AssetId) -> Result<Vec<StockTransaction>, StockError> {
        let state = self.lock()?;
        let mut entries: Vec<StockTransaction> = state
            .ledger
            .iter()
            .filter(|e| e.asset_id == asset_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    fn check_health(&self) -> Result<bool, StockError> {
        Ok(self.lock().is_ok())
    }
}
