//! PostgreSQL store over [`DbPool`].
//!
//! Tag minting locks the product row and ledger transitions lock the asset
//! row (`SELECT ... FOR UPDATE`) inside a transaction, so concurrent server
//! coroutines on different connections serialize exactly where the workflow
//! requires it and nowhere else.

use may_postgres::types::FromSql;
use may_postgres::Row;

use super::{AssetStore, CatalogStore, DirectoryService, HolderChange, SettingsStore, TagMinter, TransitionFn};
use crate::error::StockError;
use crate::executor::{DbError, DbExecutor};
use crate::model::{
    Asset, AssetId, AssetKey, AssetState, ItemModel, NewProduct, Person, Product,
    StockTransaction, TransactionType,
};
use crate::pool::DbPool;

const PRODUCT_COLUMNS: &str = "id, code, name, type, price";

const ASSET_SELECT: &str = "SELECT a.id, a.asset_tag, \
     p.id, p.code, p.name, p.type, p.price, \
     h.id_number, h.name, d.name, h.email, h.phone, h.title \
     FROM assets a \
     JOIN products p ON p.id = a.product_id \
     LEFT JOIN people h ON h.id_number = a.holder_id \
     LEFT JOIN departments d ON d.id = h.department_id";

const PERSON_SELECT: &str = "SELECT h.id_number, h.name, d.name, h.email, h.phone, h.title \
     FROM people h LEFT JOIN departments d ON d.id = h.department_id";

const ENTRY_COLUMNS: &str = "id, asset_id, transaction_type, occurred_at, remark";

/// Typed column read that reports decode failures instead of panicking.
fn col<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<T, DbError> {
    row.try_get(idx)
        .map_err(|e| DbError::ParseError(format!("column {idx}: {e}")))
}

fn product_from_row(row: &Row, offset: usize) -> Result<Product, DbError> {
    Ok(Product {
        id: col(row, offset)?,
        code: col(row, offset + 1)?,
        name: col(row, offset + 2)?,
        product_type: col(row, offset + 3)?,
        price: col(row, offset + 4)?,
    })
}

fn person_from_row(row: &Row, offset: usize) -> Result<Person, DbError> {
    Ok(Person {
        id_number: col(row, offset)?,
        name: col(row, offset + 1)?,
        department: col(row, offset + 2)?,
        email: col(row, offset + 3)?,
        phone: col(row, offset + 4)?,
        title: col(row, offset + 5)?,
    })
}

fn asset_from_row(row: &Row) -> Result<Asset, DbError> {
    let holder_id: Option<String> = col(row, 7)?;
    let holder = match holder_id {
        Some(_) => Some(person_from_row(row, 7)?),
        None => None,
    };
    Ok(Asset {
        id: col(row, 0)?,
        tag: col(row, 1)?,
        product: product_from_row(row, 2)?,
        holder,
    })
}

fn entry_from_row(row: &Row) -> Result<StockTransaction, DbError> {
    let kind: String = col(row, 2)?;
    let transaction_type = kind
        .parse::<TransactionType>()
        .map_err(|e| DbError::ParseError(format!("unknown transaction type '{}'", e.0)))?;
    Ok(StockTransaction {
        id: col(row, 0)?,
        asset_id: col(row, 1)?,
        transaction_type,
        date: col(row, 3)?,
        remark: col(row, 4)?,
    })
}

/// `%`, `_` and `\` are literal in a directory search fragment.
fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn select_asset(db: &dyn DbExecutor, id: AssetId) -> Result<Asset, StockError> {
    let sql = format!("{ASSET_SELECT} WHERE a.id = $1");
    let row = db.query_one(&sql, &[&id])?;
    Ok(asset_from_row(&row)?)
}

fn person_exists(db: &dyn DbExecutor, id_number: &str) -> Result<bool, StockError> {
    let row = db.query_opt("SELECT 1 FROM people WHERE id_number = $1", &[&id_number])?;
    Ok(row.is_some())
}

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl CatalogStore for PgStore {
    fn find_product_by_code(&self, code: &str) -> Result<Option<Product>, StockError> {
        let conn = self.pool.acquire()?;
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE code = $1");
        match conn.query_opt(&sql, &[&code])? {
            Some(row) => Ok(Some(product_from_row(&row, 0)?)),
            None => Ok(None),
        }
    }

    fn create_product(&self, new: NewProduct) -> Result<Product, StockError> {
        let conn = self.pool.acquire()?;
        let sql = format!(
            "INSERT INTO products (code, name, type, price) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (code) DO NOTHING RETURNING {PRODUCT_COLUMNS}"
        );
        match conn.query_opt(&sql, &[&new.code, &new.name, &new.product_type, &new.price])? {
            Some(row) => Ok(product_from_row(&row, 0)?),
            None => Err(StockError::conflict(format!(
                "product code '{}' already exists",
                new.code
            ))),
        }
    }

    fn get_or_create_product(&self, new: NewProduct) -> Result<(Product, bool), StockError> {
        let conn = self.pool.acquire()?;
        let insert = format!(
            "INSERT INTO products (code, name, type, price) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (code) DO NOTHING RETURNING {PRODUCT_COLUMNS}"
        );
        if let Some(row) =
            conn.query_opt(&insert, &[&new.code, &new.name, &new.product_type, &new.price])?
        {
            return Ok((product_from_row(&row, 0)?, true));
        }
        let select = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE code = $1");
        let row = conn.query_one(&select, &[&new.code])?;
        Ok((product_from_row(&row, 0)?, false))
    }

    fn list_products(&self, search: Option<&str>) -> Result<Vec<Product>, StockError> {
        let conn = self.pool.acquire()?;
        let rows = match search {
            Some(fragment) => {
                let sql = format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products \
                     WHERE code ILIKE '%' || $1 || '%' OR name ILIKE '%' || $1 || '%' \
                     OR type ILIKE '%' || $1 || '%' ORDER BY code"
                );
                conn.query_all(&sql, &[&escape_like(fragment)])?
            }
            None => {
                let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY code");
                conn.query_all(&sql, &[])?
            }
        };
        rows.iter()
            .map(|row| product_from_row(row, 0).map_err(StockError::from))
            .collect()
    }

    fn list_item_models(&self) -> Result<Vec<ItemModel>, StockError> {
        let conn = self.pool.acquire()?;
        let rows = conn.query_all("SELECT id, name FROM item_models ORDER BY id", &[])?;
        rows.iter()
            .map(|row| -> Result<ItemModel, StockError> {
                Ok(ItemModel {
                    id: col(row, 0)?,
                    name: col(row, 1)?,
                })
            })
            .collect()
    }

    fn create_item_model(&self, name: &str) -> Result<ItemModel, StockError> {
        let conn = self.pool.acquire()?;
        let row = conn.query_one(
            "INSERT INTO item_models (name) VALUES ($1) RETURNING id, name",
            &[&name],
        )?;
        Ok(ItemModel {
            id: col(&row, 0)?,
            name: col(&row, 1)?,
        })
    }
}

impl DirectoryService for PgStore {
    fn find_person(&self, id_number: &str) -> Result<Option<Person>, StockError> {
        let conn = self.pool.acquire()?;
        let sql = format!("{PERSON_SELECT} WHERE h.id_number = $1");
        match conn.query_opt(&sql, &[&id_number])? {
            Some(row) => Ok(Some(person_from_row(&row, 0)?)),
            None => Ok(None),
        }
    }

    fn search_people(&self, fragment: &str) -> Result<Vec<Person>, StockError> {
        let conn = self.pool.acquire()?;
        let sql = format!(
            "{PERSON_SELECT} WHERE h.name ILIKE '%' || $1 || '%' ORDER BY h.name, h.id_number"
        );
        let rows = conn.query_all(&sql, &[&escape_like(fragment)])?;
        rows.iter()
            .map(|row| person_from_row(row, 0).map_err(StockError::from))
            .collect()
    }
}

impl SettingsStore for PgStore {
    fn get(&self, key: &str) -> Result<Option<String>, StockError> {
        let conn = self.pool.acquire()?;
        match conn.query_opt("SELECT value FROM system_settings WHERE key = $1", &[&key])? {
            Some(row) => Ok(Some(col(&row, 0)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StockError> {
        let conn = self.pool.acquire()?;
        conn.execute(
            "INSERT INTO system_settings (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
            &[&key, &value],
        )?;
        Ok(())
    }
}

impl AssetStore for PgStore {
    fn list_assets(&self) -> Result<Vec<Asset>, StockError> {
        let conn = self.pool.acquire()?;
        let sql = format!("{ASSET_SELECT} ORDER BY a.id");
        let rows = conn.query_all(&sql, &[])?;
        rows.iter()
            .map(|row| asset_from_row(row).map_err(StockError::from))
            .collect()
    }

    fn find_asset(&self, key: &AssetKey) -> Result<Option<Asset>, StockError> {
        let conn = self.pool.acquire()?;
        let row = match key {
            AssetKey::Id(id) => {
                let sql = format!("{ASSET_SELECT} WHERE a.id = $1");
                conn.query_opt(&sql, &[id])?
            }
            AssetKey::Tag(tag) => {
                let sql = format!("{ASSET_SELECT} WHERE a.asset_tag = $1");
                conn.query_opt(&sql, &[tag])?
            }
        };
        match row {
            Some(row) => Ok(Some(asset_from_row(&row)?)),
            None => Ok(None),
        }
    }

    fn insert_asset(
        &self,
        product: &Product,
        holder_id: Option<&str>,
        mint: TagMinter<'_>,
    ) -> Result<Asset, StockError> {
        let conn = self.pool.acquire()?;
        let tx = conn.begin()?;

        // The product row lock serializes minting for this product.
        let locked = tx.query_opt(
            "SELECT id FROM products WHERE id = $1 FOR UPDATE",
            &[&product.id],
        )?;
        if locked.is_none() {
            return Err(StockError::validation(format!(
                "product '{}' does not exist",
                product.code
            )));
        }
        if let Some(holder) = holder_id {
            if !person_exists(&tx, holder)? {
                return Err(StockError::not_found("person does not exist"));
            }
        }

        let count: i64 = col(
            &tx.query_one(
                "SELECT COUNT(*) FROM assets WHERE product_id = $1",
                &[&product.id],
            )?,
            0,
        )?;
        let mut sequence = count.max(0) as u64 + 1;
        let mut tag = mint(&product.code, sequence);
        while tx
            .query_opt("SELECT 1 FROM assets WHERE asset_tag = $1", &[&tag])?
            .is_some()
        {
            sequence += 1;
            tag = mint(&product.code, sequence);
        }

        let row = tx.query_one(
            "INSERT INTO assets (product_id, asset_tag, holder_id) VALUES ($1, $2, $3) RETURNING id",
            &[&product.id, &tag, &holder_id],
        )?;
        let id: AssetId = col(&row, 0)?;
        let asset = select_asset(&tx, id)?;
        tx.commit()?;
        Ok(asset)
    }

    fn delete_asset(&self, id: AssetId) -> Result<bool, StockError> {
        let conn = self.pool.acquire()?;
        // stock_transactions cascade with the asset.
        let deleted = conn.execute("DELETE FROM assets WHERE id = $1", &[&id])?;
        Ok(deleted > 0)
    }

    fn apply_transition(
        &self,
        tag: &str,
        decide: TransitionFn<'_>,
    ) -> Result<(Asset, Vec<StockTransaction>), StockError> {
        let conn = self.pool.acquire()?;
        let tx = conn.begin()?;

        let row = tx
            .query_opt(
                "SELECT id, asset_tag, holder_id FROM assets WHERE asset_tag = $1 FOR UPDATE",
                &[&tag],
            )?
            .ok_or_else(|| StockError::not_found(format!("asset '{tag}' does not exist")))?;
        let current = AssetState {
            id: col(&row, 0)?,
            tag: col(&row, 1)?,
            holder_id: col(&row, 2)?,
        };

        let steps = decide(&current)?;
        let Some(last) = steps.last() else {
            let asset = select_asset(&tx, current.id)?;
            tx.commit()?;
            return Ok((asset, Vec::new()));
        };

        for holder in steps.iter().filter_map(|step| step.holder_id.as_ref()) {
            if !person_exists(&tx, holder)? {
                return Err(StockError::not_found("person does not exist"));
            }
        }

        tx.execute(
            "UPDATE assets SET holder_id = $1 WHERE id = $2",
            &[&last.holder_id, &current.id],
        )?;
        let sql = format!(
            "INSERT INTO stock_transactions (asset_id, transaction_type, remark) \
             VALUES ($1, $2, $3) RETURNING {ENTRY_COLUMNS}"
        );
        let mut entries = Vec::with_capacity(steps.len());
        for HolderChange { kind, remark, .. } in &steps {
            let entry_row = tx.query_one(&sql, &[&current.id, &kind.as_str(), remark])?;
            entries.push(entry_from_row(&entry_row)?);
        }
        let asset = select_asset(&tx, current.id)?;
        tx.commit()?;
        Ok((asset, entries))
    }

    fn history(&self, asset_id: AssetId) -> Result<Vec<StockTransaction>, StockError> {
        let conn = self.pool.acquire()?;
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM stock_transactions WHERE asset_id = $1 \
             ORDER BY occurred_at DESC, id DESC"
        );
        let rows = conn.query_all(&sql, &[&asset_id])?;
        rows.iter()
            .map(|row| entry_from_row(row).map_err(StockError::from))
            .collect()
    }

    fn check_health(&self) -> Result<bool, StockError> {
        let conn = self.pool.acquire()?;
        Ok(conn.check_health()?)
    }
}
