//! Transport-agnostic REST layer.
//!
//! [`handle`] maps an [`ApiRequest`] onto the workflow services and renders
//! an [`ApiResponse`]. The may_minihttp adapter in [`crate::server`] is the
//! only code that knows about sockets; tests drive this module directly.

mod handlers;
pub mod routes;
pub mod upload;

use serde::Serialize;
use serde_json::{json, Value};

use crate::app::App;
use crate::error::StockError;
use crate::intake::IntakeFailure;

use self::routes::{Route, Target};

pub const JSON: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: String,
    /// Path plus optional query string, as received.
    pub target: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    pub fn new(method: &str, target: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            target: target.to_string(),
            content_type: None,
            body: Vec::new(),
        }
    }

    pub fn with_json(mut self, body: &Value) -> Self {
        self.content_type = Some(JSON.to_string());
        self.body = body.to_string().into_bytes();
        self
    }

    pub fn with_body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.content_type = Some(content_type.to_string());
        self.body = body;
        self
    }

    /// Parse the body as JSON; an empty body reads as `{}`.
    pub fn json(&self) -> Result<Value, StockError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(json!({}));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| StockError::validation(format!("malformed JSON body: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: JSON,
                body,
            },
            Err(e) => {
                log::error!("failed to serialize response: {e}");
                Self::message(500, "internal error")
            }
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: JSON,
            body: Vec::new(),
        }
    }

    pub fn text(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    fn message(status: u16, message: &str) -> Self {
        Self::json(status, &json!({ "error": message }))
    }

    /// The body as JSON, `Null` when empty.
    pub fn json_body(&self) -> Result<Value, serde_json::Error> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body)
    }
}

fn error_body(err: &StockError) -> Value {
    match err {
        StockError::AmbiguousOwner(amb) => json!({
            "error": err.to_string(),
            "candidates": amb.candidates,
            "asset_data": amb.asset_data,
        }),
        // Storage details stay in the log.
        StockError::Storage(_) => json!({ "error": "internal storage error" }),
        _ => json!({ "error": err.to_string() }),
    }
}

impl From<StockError> for ApiResponse {
    fn from(err: StockError) -> Self {
        log_failure(&err);
        ApiResponse::json(err.status_code(), &error_body(&err))
    }
}

impl From<IntakeFailure> for ApiResponse {
    fn from(failure: IntakeFailure) -> Self {
        log_failure(&failure.error);
        let mut body = error_body(&failure.error);
        if !failure.committed.is_empty() {
            body["created"] = json!(failure.committed);
        }
        ApiResponse::json(failure.error.status_code(), &body)
    }
}

fn log_failure(err: &StockError) {
    match err {
        StockError::Storage(e) => log::error!("storage failure: {e}"),
        other => log::warn!("request rejected ({}): {other}", other.kind()),
    }
}

/// Route and serve one request.
pub fn handle(app: &App, req: &ApiRequest) -> ApiResponse {
    let target = match Target::parse(&req.target) {
        Ok(target) => target,
        Err(e) => return e.into(),
    };
    let Some(route) = target.route() else {
        return ApiResponse::message(404, "not found");
    };
    if !route.allows(&req.method) {
        return ApiResponse::message(405, "method not allowed");
    }

    let result = match (&route, req.method.as_str()) {
        (Route::Assets, "GET") => handlers::list_assets(app),
        (Route::Assets, _) => handlers::create_assets(app, req),
        (Route::Asset(key), "GET") => handlers::get_asset(app, key),
        (Route::Asset(key), "DELETE") => handlers::delete_asset(app, key),
        (Route::Asset(key), _) => handlers::update_asset(app, key, req),
        (Route::StockTransaction, _) => handlers::stock_transaction(app, req),
        (Route::StockHistory(tag), _) => handlers::stock_history(app, tag),
        (Route::CheckSetting, _) => handlers::check_setting(app),
        (Route::ToggleSetting, _) => handlers::toggle_setting(app, req),
        (Route::Products, _) => handlers::list_products(app, target.query_param("search")),
        (Route::ItemModels, "GET") => handlers::list_item_models(app),
        (Route::ItemModels, _) => handlers::create_item_model(app, req),
        (Route::Health, _) => handlers::health(app),
        (Route::Metrics, _) => handlers::metrics(),
    };
    match result {
        Ok(response) | Err(response) => response,
    }
}
