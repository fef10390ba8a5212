//! Stock ledger
//!
//! The holder state machine. An asset is either in the warehouse (no holder)
//! or checked out to one person:
//!
//! | request | in warehouse            | checked out              |
//! |---------|-------------------------|--------------------------|
//! | `OUT`   | holder := person, `OUT` | conflict                 |
//! | `IN`    | conflict                | holder := none, `IN`     |
//!
//! The decision runs under the asset's lock in the store, and the holder
//! write plus the ledger append commit together.
//!
//! [`StockLedger::reassign`] moves an asset straight to another holder as an
//! `IN` followed by an `OUT`, both in that same unit.

use std::sync::Arc;

use crate::error::StockError;
use crate::model::{Asset, AssetKey, AssetState, StockTransaction, TransactionType};
use crate::executor::DbError;
use crate::store::{AssetStore, DirectoryService, HolderChange};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub struct StockLedger {
    assets: Arc<dyn AssetStore>,
    directory: Arc<dyn DirectoryService>,
}

impl StockLedger {
    pub fn new(assets: Arc<dyn AssetStore>, directory: Arc<dyn DirectoryService>) -> Self {
        Self { assets, directory }
    }

    /// Record a stock movement given its wire name (`"IN"` / `"OUT"`).
    ///
    /// Errors, in the order they are checked: unknown asset, then for `OUT`
    /// already checked out, missing person id, unknown person; for `IN`
    /// already in warehouse; any other type is invalid.
    pub fn transact(
        &self,
        asset_tag: &str,
        transaction_type: &str,
        person_id: Option<&str>,
        remark: Option<&str>,
    ) -> Result<(Asset, StockTransaction), StockError> {
        let kind = transaction_type.parse::<TransactionType>().ok();
        self.apply(asset_tag, kind, person_id, remark)
    }

    fn apply(
        &self,
        asset_tag: &str,
        kind: Option<TransactionType>,
        person_id: Option<&str>,
        remark: Option<&str>,
    ) -> Result<(Asset, StockTransaction), StockError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::stock_transaction_span(
            asset_tag,
            kind.map_or("invalid", TransactionType::as_str),
        )
        .entered();

        let person_id = person_id.map(str::trim).filter(|id| !id.is_empty());
        let remark = remark
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        // Directory lookups take no locks; resolve before locking the asset.
        let person = match (kind, person_id) {
            (Some(TransactionType::Out), Some(id)) => self.directory.find_person(id)?,
            _ => None,
        };

        let mut decide = |state: &AssetState| -> Result<Vec<HolderChange>, StockError> {
            match kind {
                Some(TransactionType::Out) => {
                    if state.holder_id.is_some() {
                        return Err(StockError::conflict("already checked out"));
                    }
                    if person_id.is_none() {
                        return Err(StockError::validation("missing person id"));
                    }
                    let person = person
                        .as_ref()
                        .ok_or_else(|| StockError::not_found("person does not exist"))?;
                    Ok(vec![HolderChange {
                        holder_id: Some(person.id_number.clone()),
                        kind: TransactionType::Out,
                        remark: remark.clone(),
                    }])
                }
                Some(TransactionType::In) => {
                    if state.holder_id.is_none() {
                        return Err(StockError::conflict("already in warehouse"));
                    }
                    Ok(vec![HolderChange {
                        holder_id: None,
                        kind: TransactionType::In,
                        remark: remark.clone(),
                    }])
                }
                None => Err(StockError::validation("invalid transaction type")),
            }
        };

        let (asset, entry) = match self.assets.apply_transition(asset_tag, &mut decide) {
            Ok((asset, entries)) => {
                let entry = entries.into_iter().next().ok_or_else(|| {
                    StockError::Storage(DbError::Other(format!(
                        "no ledger entry written for {asset_tag}"
                    )))
                })?;
                (asset, entry)
            }
            Err(e) => {
                log::debug!("stock transaction on {asset_tag} rejected: {e}");
                return Err(e);
            }
        };
        self.observe(&asset, std::slice::from_ref(&entry));
        Ok((asset, entry))
    }

    /// Move the asset to `target`, or back to the warehouse when `None`.
    ///
    /// A current holder is checked in first; a target is then checked out
    /// to. Both entries carry `remark` and commit together. An unknown
    /// target is `NotFound` with nothing written, and an unchanged holder
    /// writes nothing at all.
    pub fn reassign(
        &self,
        asset_tag: &str,
        target: Option<&str>,
        remark: &str,
    ) -> Result<(Asset, Vec<StockTransaction>), StockError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::stock_transaction_span(asset_tag, "REASSIGN").entered();

        let target = target.map(str::trim).filter(|id| !id.is_empty());
        let person = match target {
            Some(id) => Some(
                self.directory
                    .find_person(id)?
                    .ok_or_else(|| StockError::not_found("person does not exist"))?,
            ),
            None => None,
        };
        let target_id = person.as_ref().map(|p| p.id_number.clone());

        let mut decide = |state: &AssetState| -> Result<Vec<HolderChange>, StockError> {
            if state.holder_id == target_id {
                return Ok(Vec::new());
            }
            let mut steps = Vec::with_capacity(2);
            if state.holder_id.is_some() {
                steps.push(HolderChange {
                    holder_id: None,
                    kind: TransactionType::In,
                    remark: Some(remark.to_string()),
                });
            }
            if let Some(id) = &target_id {
                steps.push(HolderChange {
                    holder_id: Some(id.clone()),
                    kind: TransactionType::Out,
                    remark: Some(remark.to_string()),
                });
            }
            Ok(steps)
        };

        let (asset, entries) = self
            .assets
            .apply_transition(asset_tag, &mut decide)
            .map_err(|e| {
                log::debug!("reassigning {asset_tag} rejected: {e}");
                e
            })?;
        self.observe(&asset, &entries);
        Ok((asset, entries))
    }

    fn observe(&self, asset: &Asset, entries: &[StockTransaction]) {
        for entry in entries {
            #[cfg(feature = "metrics")]
            METRICS.record_stock_transaction(entry.transaction_type.as_str());
            log::info!(
                "{} {} (holder now: {})",
                entry.transaction_type,
                asset.tag,
                asset.holder.as_ref().map_or("warehouse", |p| p.id_number.as_str())
            );
        }
    }

    /// Ledger entries for the asset, newest first.
    pub fn history(&self, asset_tag: &str) -> Result<Vec<StockTransaction>, StockError> {
        let asset = self
            .assets
            .find_asset(&AssetKey::Tag(asset_tag.to_string()))?
            .ok_or_else(|| StockError::not_found(format!("asset {asset_tag} does not exist")))?;
        self.assets.history(asset.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewProduct, Person};
    use crate::registry::AssetRegistry;
    use crate::store::{CatalogStore, MemoryStore};
    use rust_decimal::Decimal;

    fn person(id: &str, name: &str) -> Person {
        Person {
            id_number: id.to_string(),
            name: name.to_string(),
            department: Some("IT".to_string()),
            email: None,
            phone: None,
            title: None,
        }
    }

    fn setup() -> (StockLedger, Asset) {
        let store = Arc::new(MemoryStore::with_people([
            person("A1", "May Chen"),
            person("A2", "Kai Wu"),
        ]));
        let (product, _) = store
            .get_or_create_product(NewProduct {
                code: "SK".to_string(),
                name: "Scanner".to_string(),
                product_type: String::new(),
                price: Decimal::ZERO,
            })
            .unwrap();
        let asset = AssetRegistry::new(store.clone()).create(&product, None).unwrap();
        (StockLedger::new(store.clone(), store), asset)
    }

    #[test]
    fn test_out_then_in() {
        let (ledger, asset) = setup();
        let (out, entry) = ledger.transact(&asset.tag, "OUT", Some("A1"), Some("loan")).unwrap();
        assert_eq!(out.holder.as_ref().map(|p| p.id_number.as_str()), Some("A1"));
        assert_eq!(entry.transaction_type, TransactionType::Out);
        assert_eq!(entry.remark.as_deref(), Some("loan"));

        let (back, entry) = ledger.transact(&asset.tag, "IN", None, None).unwrap();
        assert!(back.in_warehouse());
        assert_eq!(entry.transaction_type, TransactionType::In);

        let history = ledger.history(&asset.tag).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].transaction_type, TransactionType::In);
        assert_eq!(history[1].transaction_type, TransactionType::Out);
    }

    #[test]
    fn test_conflicts() {
        let (ledger, asset) = setup();
        let err = ledger.transact(&asset.tag, "IN", None, None).unwrap_err();
        assert_eq!(err.to_string(), "already in warehouse");

        ledger.transact(&asset.tag, "OUT", Some("A1"), None).unwrap();
        let err = ledger.transact(&asset.tag, "OUT", Some("A1"), None).unwrap_err();
        assert!(matches!(err, StockError::Conflict(_)));
        assert_eq!(err.to_string(), "already checked out");
        assert_eq!(ledger.history(&asset.tag).unwrap().len(), 1);
    }

    #[test]
    fn test_out_check_order() {
        let (ledger, asset) = setup();
        let err = ledger.transact(&asset.tag, "OUT", None, None).unwrap_err();
        assert!(matches!(err, StockError::Validation(_)));
        assert_eq!(err.to_string(), "missing person id");

        let err = ledger.transact(&asset.tag, "OUT", Some("ZZ"), None).unwrap_err();
        assert!(matches!(err, StockError::NotFound(_)));
        assert_eq!(err.to_string(), "person does not exist");

        // A checked-out asset reports the conflict before looking at the person.
        ledger.transact(&asset.tag, "OUT", Some("A1"), None).unwrap();
        let err = ledger.transact(&asset.tag, "OUT", Some("ZZ"), None).unwrap_err();
        assert!(matches!(err, StockError::Conflict(_)));
    }

    #[test]
    fn test_invalid_type_and_unknown_asset() {
        let (ledger, asset) = setup();
        let err = ledger.transact(&asset.tag, "out", Some("A1"), None).unwrap_err();
        assert_eq!(err.to_string(), "invalid transaction type");

        let err = ledger.transact("NOPE-001", "TRANSFER", None, None).unwrap_err();
        assert!(matches!(err, StockError::NotFound(_)));
        assert!(matches!(
            ledger.history("NOPE-001").unwrap_err(),
            StockError::NotFound(_)
        ));
    }

    #[test]
    fn test_reassign_moves_holder_in_one_step() {
        let (ledger, asset) = setup();
        ledger.transact(&asset.tag, "OUT", Some("A1"), None).unwrap();

        let (moved, entries) = ledger.reassign(&asset.tag, Some("A2"), "desk swap").unwrap();
        assert_eq!(moved.holder.unwrap().id_number, "A2");
        let kinds: Vec<_> = entries.iter().map(|e| e.transaction_type).collect();
        assert_eq!(kinds, vec![TransactionType::In, TransactionType::Out]);
        assert!(entries.iter().all(|e| e.remark.as_deref() == Some("desk swap")));

        let (same, entries) = ledger.reassign(&asset.tag, Some("A2"), "desk swap").unwrap();
        assert!(entries.is_empty());
        assert_eq!(same.holder.unwrap().id_number, "A2");

        let (back, entries) = ledger.reassign(&asset.tag, None, "returned").unwrap();
        assert!(back.in_warehouse());
        assert_eq!(entries.len(), 1);
        assert_eq!(ledger.history(&asset.tag).unwrap().len(), 4);
    }

    #[test]
    fn test_reassign_to_unknown_person_writes_nothing() {
        let (ledger, asset) = setup();
        ledger.transact(&asset.tag, "OUT", Some("A1"), None).unwrap();

        let err = ledger.reassign(&asset.tag, Some("GHOST"), "swap").unwrap_err();
        assert!(matches!(err, StockError::NotFound(_)));
        assert_eq!(err.to_string(), "person does not exist");
        assert_eq!(ledger.history(&asset.tag).unwrap().len(), 1);
        let (still, _) = ledger.reassign(&asset.tag, Some("A1"), "noop").unwrap();
        assert_eq!(still.holder.unwrap().id_number, "A1");
    }
}
