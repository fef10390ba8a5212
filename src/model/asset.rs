use serde::{Deserialize, Serialize};

use super::{Person, Product};

pub type AssetId = i64;

/// A physical unit of a product, as returned to API callers: product and
/// holder are resolved. `holder == None` means the asset is in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    #[serde(rename = "asset_tag")]
    pub tag: String,
    pub product: Product,
    pub holder: Option<Person>,
}

impl Asset {
    pub fn in_warehouse(&self) -> bool {
        self.holder.is_none()
    }
}

/// The slice of an asset the ledger decides on, read under the asset's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetState {
    pub id: AssetId,
    pub tag: String,
    pub holder_id: Option<String>,
}

/// How a caller addresses an asset: by row id or by tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKey {
    Id(AssetId),
    Tag(String),
}

impl AssetKey {
    /// Purely numeric keys are ids; tags always carry a `-`.
    pub fn parse(raw: &str) -> AssetKey {
        let raw = raw.trim();
        match raw.parse::<AssetId>() {
            Ok(id) if !raw.starts_with('-') && !raw.starts_with('+') => AssetKey::Id(id),
            _ => AssetKey::Tag(raw.to_string()),
        }
    }
}

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKey::Id(id) => write!(f, "#{id}"),
            AssetKey::Tag(tag) => write!(f, "{tag}"),
        }
    }
}
