//! Service wiring: one store, every workflow component over it.

use std::sync::Arc;

use crate::error::StockError;
use crate::intake::IntakePipeline;
use crate::ledger::StockLedger;
use crate::model::PRODUCT_DUPLICATE_CHECK;
use crate::registry::AssetRegistry;
use crate::store::{AssetStore, CatalogStore, SettingsStore, Store};

pub struct App {
    pub catalog: Arc<dyn CatalogStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub registry: Arc<AssetRegistry>,
    pub ledger: StockLedger,
    pub intake: IntakePipeline,
    assets: Arc<dyn AssetStore>,
}

impl App {
    pub fn new<S: Store + 'static>(store: Arc<S>) -> Self {
        let registry = Arc::new(AssetRegistry::new(store.clone()));
        Self {
            catalog: store.clone(),
            settings: store.clone(),
            ledger: StockLedger::new(store.clone(), store.clone()),
            intake: IntakePipeline::new(
                store.clone(),
                store.clone(),
                store.clone(),
                Arc::clone(&registry),
            ),
            registry,
            assets: store,
        }
    }

    pub fn duplicate_check_enabled(&self) -> Result<bool, StockError> {
        self.settings.get_bool(PRODUCT_DUPLICATE_CHECK, false)
    }

    pub fn set_duplicate_check(&self, enabled: bool) -> Result<bool, StockError> {
        self.settings.set_bool(PRODUCT_DUPLICATE_CHECK, enabled)?;
        log::info!("{PRODUCT_DUPLICATE_CHECK} set to {enabled}");
        Ok(enabled)
    }

    pub fn check_health(&self) -> Result<bool, StockError> {
        self.assets.check_health()
    }
}
