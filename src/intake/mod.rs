//! Intake pipeline
//!
//! Turns an upload or a JSON payload into assets. Both sources normalize to
//! a list of [`IntakeEntry`] values that are processed one at a time, in
//! order, each one committed before the next starts:
//!
//! 1. require a product code and check field lengths
//! 2. resolve the product (get-or-create, or reuse under the duplicate check)
//! 3. resolve the owner name against the directory
//! 4. create the asset through the registry
//!
//! The first failing entry stops the batch. Entries already processed stay
//! committed and are reported in [`IntakeFailure::committed`].

pub mod tabular;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{AmbiguousOwner, PendingAsset, StockError};
use crate::model::{Asset, NewProduct, Person, Product, PRODUCT_DUPLICATE_CHECK};
use crate::registry::AssetRegistry;
use crate::store::{CatalogStore, DirectoryService, SettingsStore};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub use tabular::{parse_csv, parse_people_csv};

/// One asset to create, as supplied by the caller. Values are raw text;
/// validation happens in the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeEntry {
    pub product_code: String,
    pub name: Option<String>,
    pub product_type: Option<String>,
    pub price: Option<String>,
    pub owner_name: Option<String>,
}

impl IntakeEntry {
    /// Read a single JSON intake object. `owner_user` is accepted for
    /// `owner_name`, and price may be a number or a string.
    pub fn from_json(body: &Value) -> Result<Self, StockError> {
        let fields = body
            .as_object()
            .ok_or_else(|| StockError::validation("request body must be a JSON object"))?;

        let text = |key: &str| -> Result<Option<String>, StockError> {
            match fields.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
                Some(Value::Number(n)) => Ok(Some(n.to_string())),
                Some(_) => Err(StockError::validation(format!("{key} must be a string"))),
            }
        };

        let owner_name = match text("owner_name")? {
            Some(owner) => Some(owner),
            None => text("owner_user")?,
        };
        Ok(Self {
            product_code: text("product_code")?.unwrap_or_default(),
            name: text("name")?,
            product_type: text("type")?,
            price: text("price")?,
            owner_name,
        })
    }
}

/// Where a batch came from; decides the product policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeSource {
    /// Uploaded spreadsheet: always get-or-create by code.
    Tabular,
    /// JSON payload: honours the duplicate-check setting.
    Json,
}

impl IntakeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            IntakeSource::Tabular => "tabular",
            IntakeSource::Json => "json",
        }
    }
}

/// Result of looking an owner name up in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerMatch {
    None,
    One(Person),
    Many(Vec<Person>),
}

impl OwnerMatch {
    pub fn from_candidates(mut candidates: Vec<Person>) -> Self {
        match candidates.len() {
            0 => OwnerMatch::None,
            1 => OwnerMatch::One(candidates.remove(0)),
            _ => OwnerMatch::Many(candidates),
        }
    }
}

/// What a successful intake returns: the asset itself for a single entry,
/// the ordered list otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IntakeOutcome {
    Single(Asset),
    Batch(Vec<Asset>),
}

impl IntakeOutcome {
    pub fn assets(&self) -> &[Asset] {
        match self {
            IntakeOutcome::Single(asset) => std::slice::from_ref(asset),
            IntakeOutcome::Batch(assets) => assets,
        }
    }
}

/// A stopped batch: the error plus everything committed before it.
#[derive(Debug)]
pub struct IntakeFailure {
    pub error: StockError,
    pub committed: Vec<Asset>,
}

impl fmt::Display for IntakeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.committed.is_empty() {
            write!(f, "{}", self.error)
        } else {
            write!(
                f,
                "{} (after {} asset(s) were created)",
                self.error,
                self.committed.len()
            )
        }
    }
}

impl std::error::Error for IntakeFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<StockError> for IntakeFailure {
    fn from(error: StockError) -> Self {
        Self {
            error,
            committed: Vec::new(),
        }
    }
}

fn parse_price(raw: Option<&str>) -> Result<Decimal, StockError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Decimal::ZERO),
        Some(s) => s
            .parse::<Decimal>()
            .map(|d| d.round_dp(2))
            .map_err(|_| StockError::validation("invalid price")),
    }
}

pub struct IntakePipeline {
    catalog: Arc<dyn CatalogStore>,
    directory: Arc<dyn DirectoryService>,
    settings: Arc<dyn SettingsStore>,
    registry: Arc<AssetRegistry>,
}

impl IntakePipeline {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        directory: Arc<dyn DirectoryService>,
        settings: Arc<dyn SettingsStore>,
        registry: Arc<AssetRegistry>,
    ) -> Self {
        Self {
            catalog,
            directory,
            settings,
            registry,
        }
    }

    /// Process `entries` in order.
    pub fn run(
        &self,
        source: IntakeSource,
        entries: Vec<IntakeEntry>,
    ) -> Result<IntakeOutcome, IntakeFailure> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::intake_span(source.as_str(), entries.len()).entered();

        if entries.is_empty() {
            return Err(StockError::validation("no intake entries").into());
        }
        let single = entries.len() == 1;

        let mut created = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            match self.intake_one(source, entry) {
                Ok(asset) => created.push(asset),
                Err(error) => {
                    log::warn!(
                        "{} intake stopped at entry {} of {}: {error}",
                        source.as_str(),
                        index + 1,
                        entries.len()
                    );
                    return Err(IntakeFailure {
                        error,
                        committed: created,
                    });
                }
            }
        }

        log::info!("{} intake created {} asset(s)", source.as_str(), created.len());
        if single {
            // Exactly one entry succeeded.
            if let Some(asset) = created.pop() {
                return Ok(IntakeOutcome::Single(asset));
            }
        }
        Ok(IntakeOutcome::Batch(created))
    }

    /// Directory lookup for an owner name; blank names match nobody.
    pub fn resolve_owner(&self, owner_name: Option<&str>) -> Result<OwnerMatch, StockError> {
        match owner_name.map(str::trim) {
            None | Some("") => Ok(OwnerMatch::None),
            Some(name) => Ok(OwnerMatch::from_candidates(
                self.directory.search_people(name)?,
            )),
        }
    }

    fn intake_one(&self, source: IntakeSource, entry: &IntakeEntry) -> Result<Asset, StockError> {
        let code = entry.product_code.trim();
        if code.is_empty() {
            return Err(StockError::validation("product code required"));
        }
        let price = parse_price(entry.price.as_deref())?;
        let product_type = entry.product_type.clone().unwrap_or_default();

        let new = NewProduct {
            code: code.to_string(),
            name: entry.name.clone().unwrap_or_else(|| code.to_string()),
            product_type: product_type.clone(),
            price,
        };
        new.validate()?;
        let product = self.resolve_product(source, new)?;

        match self.resolve_owner(entry.owner_name.as_deref())? {
            OwnerMatch::None => self.registry.create(&product, None),
            OwnerMatch::One(person) => self.registry.create(&product, Some(&person)),
            OwnerMatch::Many(candidates) => {
                #[cfg(feature = "metrics")]
                METRICS.record_intake_conflict();
                let owner_name = entry.owner_name.clone().unwrap_or_default();
                log::debug!(
                    "owner '{owner_name}' is ambiguous ({} candidates) for {code}",
                    candidates.len()
                );
                Err(StockError::AmbiguousOwner(Box::new(AmbiguousOwner {
                    owner_name,
                    candidates,
                    asset_data: PendingAsset {
                        product_code: code.to_string(),
                        name: entry.name.clone(),
                        product_type,
                        price,
                    },
                })))
            }
        }
    }

    fn resolve_product(&self, source: IntakeSource, new: NewProduct) -> Result<Product, StockError> {
        let reuse_existing = match source {
            IntakeSource::Tabular => false,
            IntakeSource::Json => self.settings.get_bool(PRODUCT_DUPLICATE_CHECK, false)?,
        };

        if reuse_existing {
            if let Some(existing) = self.catalog.find_product_by_code(&new.code)? {
                log::debug!("reusing product {} as-is", existing.code);
                return Ok(existing);
            }
            return self.catalog.create_product(new);
        }

        let (product, created) = self.catalog.get_or_create_product(new)?;
        if created {
            log::debug!("created product {}", product.code);
        }
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_entry_aliases_and_numbers() {
        let entry = IntakeEntry::from_json(&json!({
            "product_code": "SK",
            "name": "Laptop",
            "price": 1200.5,
            "owner_user": "May"
        }))
        .unwrap();
        assert_eq!(entry.product_code, "SK");
        assert_eq!(entry.price.as_deref(), Some("1200.5"));
        assert_eq!(entry.owner_name.as_deref(), Some("May"));
        assert_eq!(entry.product_type, None);
    }

    #[test]
    fn test_json_entry_rejects_non_objects() {
        assert!(IntakeEntry::from_json(&json!("SK")).is_err());
        assert!(IntakeEntry::from_json(&json!({"product_code": ["SK"]})).is_err());
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(None).unwrap(), Decimal::ZERO);
        assert_eq!(parse_price(Some(" ")).unwrap(), Decimal::ZERO);
        assert_eq!(parse_price(Some("12.345")).unwrap(), Decimal::new(1234, 2));
        assert_eq!(
            parse_price(Some("abc")).unwrap_err().to_string(),
            "invalid price"
        );
    }

    #[test]
    fn test_owner_match_from_candidates() {
        let p = |id: &str| Person {
            id_number: id.to_string(),
            name: format!("May {id}"),
            department: None,
            email: None,
            phone: None,
            title: None,
        };
        assert_eq!(OwnerMatch::from_candidates(vec![]), OwnerMatch::None);
        assert_eq!(OwnerMatch::from_candidates(vec![p("1")]), OwnerMatch::One(p("1")));
        assert!(matches!(
            OwnerMatch::from_candidates(vec![p("1"), p("2")]),
            OwnerMatch::Many(c) if c.len() == 2
        ));
    }
}
