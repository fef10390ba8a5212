use serde::Deserialize;
use serde_json::{json, Value};

use super::upload::{self, FILE_FIELD};
use super::{ApiRequest, ApiResponse};
use crate::app::App;
use crate::error::StockError;
use crate::intake::{parse_csv, IntakeEntry, IntakeSource};
use crate::model::{check_len, parse_truthy, AssetKey, ITEM_MODEL_NAME_MAX_LEN};
use crate::registry::AssetPatch;

type Handled = Result<ApiResponse, ApiResponse>;

pub(super) fn list_assets(app: &App) -> Handled {
    let assets = app.registry.list()?;
    Ok(ApiResponse::json(200, &assets))
}

/// `POST /assets/`: multipart or raw CSV upload, otherwise one JSON entry.
pub(super) fn create_assets(app: &App, req: &ApiRequest) -> Handled {
    let content_type = req.content_type.as_deref();
    let (source, entries) = if upload::is_multipart(content_type) {
        let data = upload::extract_field(content_type.unwrap_or_default(), req.body.clone(), FILE_FIELD)?;
        (IntakeSource::Tabular, parse_csv(&data)?)
    } else if content_type.is_some_and(|ct| ct.starts_with("text/csv")) {
        (IntakeSource::Tabular, parse_csv(&req.body)?)
    } else {
        let entry = IntakeEntry::from_json(&req.json()?)?;
        (IntakeSource::Json, vec![entry])
    };

    let outcome = app.intake.run(source, entries)?;
    Ok(ApiResponse::json(201, &outcome))
}

pub(super) fn get_asset(app: &App, key: &str) -> Handled {
    let asset = app.registry.get(&AssetKey::parse(key))?;
    Ok(ApiResponse::json(200, &asset))
}

pub(super) fn update_asset(app: &App, key: &str, req: &ApiRequest) -> Handled {
    let asset = app.registry.get(&AssetKey::parse(key))?;
    let patch = AssetPatch::from_json(&req.json()?)?;
    let updated = app.registry.update(asset.id, &patch, &app.ledger)?;
    Ok(ApiResponse::json(200, &updated))
}

pub(super) fn delete_asset(app: &App, key: &str) -> Handled {
    let asset = app.registry.get(&AssetKey::parse(key))?;
    app.registry.delete(asset.id)?;
    Ok(ApiResponse::empty(204))
}

#[derive(Debug, Deserialize)]
struct StockTransactionBody {
    asset_tag: Option<String>,
    transaction_type: Option<String>,
    person_id: Option<String>,
    remark: Option<String>,
}

pub(super) fn stock_transaction(app: &App, req: &ApiRequest) -> Handled {
    let body: StockTransactionBody = serde_json::from_value(req.json()?)
        .map_err(|e| StockError::validation(format!("malformed stock transaction: {e}")))?;
    let asset_tag = body
        .asset_tag
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| StockError::validation("asset tag required"))?;

    let (asset, _) = app.ledger.transact(
        asset_tag,
        body.transaction_type.as_deref().unwrap_or_default(),
        body.person_id.as_deref(),
        body.remark.as_deref(),
    )?;
    Ok(ApiResponse::json(200, &json!({ "success": true, "asset": asset })))
}

pub(super) fn stock_history(app: &App, tag: &str) -> Handled {
    let entries = app.ledger.history(tag)?;
    Ok(ApiResponse::json(200, &entries))
}

pub(super) fn check_setting(app: &App) -> Handled {
    let enabled = app.duplicate_check_enabled()?;
    Ok(ApiResponse::json(200, &json!({ "enabled": enabled })))
}

/// `enabled` follows JSON truthiness; strings use the settings truthy set.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => parse_truthy(s),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

pub(super) fn toggle_setting(app: &App, req: &ApiRequest) -> Handled {
    let body = req.json()?;
    let enabled = app.set_duplicate_check(truthy(body.get("enabled")))?;
    Ok(ApiResponse::json(200, &json!({ "enabled": enabled })))
}

pub(super) fn list_products(app: &App, search: Option<&str>) -> Handled {
    let search = search.map(str::trim).filter(|s| !s.is_empty());
    let products = app.catalog.list_products(search)?;
    Ok(ApiResponse::json(200, &products))
}

pub(super) fn list_item_models(app: &App) -> Handled {
    let models = app.catalog.list_item_models()?;
    Ok(ApiResponse::json(200, &models))
}

pub(super) fn create_item_model(app: &App, req: &ApiRequest) -> Handled {
    let body = req.json()?;
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| StockError::validation("name required"))?;
    check_len("name", name, ITEM_MODEL_NAME_MAX_LEN)?;
    let model = app.catalog.create_item_model(name)?;
    Ok(ApiResponse::json(201, &model))
}

pub(super) fn health(app: &App) -> Handled {
    match app.check_health() {
        Ok(true) => Ok(ApiResponse::json(200, &json!({ "status": "ok" }))),
        Ok(false) => Ok(ApiResponse::json(503, &json!({ "status": "unavailable" }))),
        Err(e) => {
            log::error!("health check failed: {e}");
            Ok(ApiResponse::json(503, &json!({ "status": "unavailable" })))
        }
    }
}

#[cfg(feature = "metrics")]
pub(super) fn metrics() -> Handled {
    Ok(ApiResponse::text(
        200,
        "text/plain; version=0.0.4",
        crate::metrics::METRICS.render(),
    ))
}

#[cfg(not(feature = "metrics"))]
pub(super) fn metrics() -> Handled {
    Err(StockError::not_found("metrics are disabled").into())
}
