//! Request target parsing and route table.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::StockError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Assets,
    Asset(String),
    StockTransaction,
    StockHistory(String),
    CheckSetting,
    ToggleSetting,
    Products,
    ItemModels,
    Health,
    Metrics,
}

impl Route {
    pub fn allows(&self, method: &str) -> bool {
        let allowed: &[&str] = match self {
            Route::Assets | Route::ItemModels => &["GET", "POST"],
            Route::Asset(_) => &["GET", "PUT", "PATCH", "DELETE"],
            Route::StockTransaction | Route::ToggleSetting => &["POST"],
            Route::StockHistory(_)
            | Route::CheckSetting
            | Route::Products
            | Route::Health
            | Route::Metrics => &["GET"],
        };
        allowed.contains(&method)
    }
}

/// A parsed request target: the decoded path segments and query pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self, StockError> {
        let base = Url::parse("http://stockroom.invalid/")
            .map_err(|e| StockError::validation(format!("bad request target: {e}")))?;
        let url = base
            .join(raw)
            .map_err(|e| StockError::validation(format!("bad request target: {e}")))?;

        let mut segments = Vec::new();
        if let Some(parts) = url.path_segments() {
            for part in parts.filter(|p| !p.is_empty()) {
                let decoded = percent_decode_str(part)
                    .decode_utf8()
                    .map_err(|_| StockError::validation("request path is not valid UTF-8"))?;
                segments.push(decoded.into_owned());
            }
        }
        let query = url.query_pairs().into_owned().collect();
        Ok(Self { segments, query })
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Match against the route table. Trailing slashes are optional.
    pub fn route(&self) -> Option<Route> {
        let segments: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        let route = match segments.as_slice() {
            ["assets"] => Route::Assets,
            ["assets", key] => Route::Asset((*key).to_string()),
            ["stock_transaction"] => Route::StockTransaction,
            ["stock_history", tag] => Route::StockHistory((*tag).to_string()),
            ["check-setting"] => Route::CheckSetting,
            ["toggle-setting"] => Route::ToggleSetting,
            ["products"] => Route::Products,
            ["item-models"] => Route::ItemModels,
            ["health"] => Route::Health,
            ["metrics"] => Route::Metrics,
            _ => return None,
        };
        Some(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(raw: &str) -> Option<Route> {
        Target::parse(raw).unwrap().route()
    }

    #[test]
    fn test_trailing_slash_optional() {
        assert_eq!(route("/assets/"), Some(Route::Assets));
        assert_eq!(route("/assets"), Some(Route::Assets));
        assert_eq!(route("/assets/12/"), Some(Route::Asset("12".to_string())));
        assert_eq!(route("/stock_history/SK-001"), Some(Route::StockHistory("SK-001".to_string())));
        assert_eq!(route("/nope/"), None);
        assert_eq!(route("/assets/1/extra/"), None);
    }

    #[test]
    fn test_decodes_segments_and_query() {
        let target = Target::parse("/stock_history/%E7%AD%86%E9%9B%BB-001/").unwrap();
        assert_eq!(target.route(), Some(Route::StockHistory("筆電-001".to_string())));

        let target = Target::parse("/products/?search=note+book&x=1").unwrap();
        assert_eq!(target.route(), Some(Route::Products));
        assert_eq!(target.query_param("search"), Some("note book"));
        assert_eq!(target.query_param("missing"), None);
    }

    #[test]
    fn test_methods() {
        assert!(Route::Assets.allows("POST"));
        assert!(!Route::Assets.allows("DELETE"));
        assert!(Route::Asset("1".to_string()).allows("DELETE"));
        assert!(!Route::StockTransaction.allows("GET"));
    }
}
