//! Asset registry
//!
//! Owns asset records: tag minting, lookup, partial update and delete.
//! Holder changes requested through [`AssetRegistry::update`] are routed
//! through the [`StockLedger`] so every holder change has a ledger entry.

use serde_json::Value;
use std::sync::Arc;

use crate::error::StockError;
use crate::ledger::StockLedger;
use crate::model::{Asset, AssetId, AssetKey, Person, Product};
use crate::store::AssetStore;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Remark written on ledger entries produced by an asset edit.
pub const EDIT_REMARK: &str = "holder updated via asset edit";

/// `"{code}-{sequence:03}"`: zero padded to three digits, wider when needed.
pub fn mint_tag(code: &str, sequence: u64) -> String {
    format!("{code}-{sequence:03}")
}

/// A validated partial update of an asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetPatch {
    /// `None` leaves the holder alone, `Some(None)` returns the asset to the
    /// warehouse, `Some(Some(id))` hands it to that person.
    pub holder_id: Option<Option<String>>,
}

impl AssetPatch {
    /// Validate an update payload. Identity fields are immutable; unknown
    /// fields are ignored.
    pub fn from_json(body: &Value) -> Result<Self, StockError> {
        let fields = body
            .as_object()
            .ok_or_else(|| StockError::validation("request body must be a JSON object"))?;

        if fields.contains_key("tag") || fields.contains_key("asset_tag") {
            return Err(StockError::validation("asset tag cannot be changed"));
        }
        if ["product", "product_id", "product_code"]
            .iter()
            .any(|k| fields.contains_key(*k))
        {
            return Err(StockError::validation("asset product cannot be changed"));
        }

        let holder_id = match fields.get("holder_id") {
            None => None,
            Some(Value::Null) => Some(None),
            Some(Value::String(s)) if s.trim().is_empty() => Some(None),
            Some(Value::String(s)) => Some(Some(s.trim().to_string())),
            Some(_) => return Err(StockError::validation("holder_id must be a string or null")),
        };
        Ok(Self { holder_id })
    }
}

pub struct AssetRegistry {
    assets: Arc<dyn AssetStore>,
}

impl AssetRegistry {
    pub fn new(assets: Arc<dyn AssetStore>) -> Self {
        Self { assets }
    }

    /// Create an asset of `product`, minting its tag. A holder set here is an
    /// initial assignment and writes no ledger entry.
    pub fn create(&self, product: &Product, holder: Option<&Person>) -> Result<Asset, StockError> {
        let holder_id = holder.map(|p| p.id_number.as_str());
        let asset = self.assets.insert_asset(product, holder_id, &mint_tag)?;

        #[cfg(feature = "metrics")]
        METRICS.record_asset_created();
        log::debug!(
            "created asset {} for product {} (holder: {})",
            asset.tag,
            product.code,
            holder_id.unwrap_or("-")
        );
        Ok(asset)
    }

    pub fn get(&self, key: &AssetKey) -> Result<Asset, StockError> {
        self.assets
            .find_asset(key)?
            .ok_or_else(|| StockError::not_found(format!("asset {key} does not exist")))
    }

    pub fn list(&self) -> Result<Vec<Asset>, StockError> {
        self.assets.list_assets()
    }

    /// Apply `patch` to asset `id`. A holder change becomes an `IN` for the
    /// current holder and/or an `OUT` to the new one, committed together.
    pub fn update(
        &self,
        id: AssetId,
        patch: &AssetPatch,
        ledger: &StockLedger,
    ) -> Result<Asset, StockError> {
        let asset = self.get(&AssetKey::Id(id))?;
        let Some(target) = &patch.holder_id else {
            return Ok(asset);
        };
        let (updated, _) = ledger.reassign(&asset.tag, target.as_deref(), EDIT_REMARK)?;
        Ok(updated)
    }

    pub fn delete(&self, id: AssetId) -> Result<(), StockError> {
        if self.assets.delete_asset(id)? {
            log::info!("deleted asset #{id} and its ledger entries");
            Ok(())
        } else {
            Err(StockError::not_found(format!("asset #{id} does not exist")))
        }
    }
}
