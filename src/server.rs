//! may_minihttp adapter for the API layer.
//!
//! Each connection runs on its own coroutine; the service copies the request
//! into an [`ApiRequest`], lets [`api::handle`] answer it and writes the
//! result back.

use may_minihttp::{HttpServer, HttpService, Request, Response};
use std::io::{self, Read};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{self, ApiRequest, ApiResponse, JSON};
use crate::app::App;
use crate::config::ServerConfig;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

#[derive(Clone)]
pub struct StockroomService {
    app: Arc<App>,
    max_body_bytes: usize,
}

impl StockroomService {
    pub fn new(app: Arc<App>, max_body_bytes: usize) -> Self {
        Self {
            app,
            max_body_bytes,
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

fn content_type_header(content_type: &str) -> &'static str {
    if content_type == JSON {
        "Content-Type: application/json"
    } else {
        "Content-Type: text/plain; version=0.0.4; charset=utf-8"
    }
}

fn write_response(res: &mut Response, response: ApiResponse) {
    res.status_code(usize::from(response.status), reason(response.status));
    res.header(content_type_header(response.content_type));
    res.body_vec(response.body);
}

impl HttpService for StockroomService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let request_id = Uuid::new_v4();
        let method = req.method().to_ascii_uppercase();
        let target = req.path().to_string();
        let content_type = req
            .headers()
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("content-type"))
            .and_then(|h| std::str::from_utf8(h.value).ok())
            .map(str::to_string);

        let mut body = Vec::new();
        req.body()
            .take(self.max_body_bytes as u64 + 1)
            .read_to_end(&mut body)?;

        let response = if body.len() > self.max_body_bytes {
            log::warn!("[{request_id}] {method} {target}: body exceeds {} bytes", self.max_body_bytes);
            ApiResponse::json(
                413,
                &serde_json::json!({ "error": "request body too large" }),
            )
        } else {
            let request = ApiRequest {
                method: method.clone(),
                target: target.clone(),
                content_type,
                body,
            };
            api::handle(&self.app, &request)
        };

        let status = response.status;
        #[cfg(feature = "metrics")]
        METRICS.record_http_response(&method, status);
        if status >= 500 {
            log::error!("[{request_id}] {method} {target} -> {status}");
        } else {
            log::info!("[{request_id}] {method} {target} -> {status}");
        }

        write_response(res, response);
        Ok(())
    }
}

/// Bind `config.bind` and serve until the returned handle is joined or the
/// process exits.
///
/// # Errors
///
/// Returns an I/O error if the address cannot be bound.
pub fn start(
    app: Arc<App>,
    config: &ServerConfig,
) -> io::Result<may::coroutine::JoinHandle<()>> {
    let service = StockroomService::new(app, config.max_body_bytes);
    let handle = HttpServer(service).start(&config.bind)?;
    log::info!("stockroom API listening on http://{}", config.bind);
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_phrases() {
        assert_eq!(reason(201), "Created");
        assert_eq!(reason(409), "Conflict");
        assert_eq!(reason(500), "Internal Server Error");
    }

    #[test]
    fn test_content_type_header() {
        assert_eq!(content_type_header(JSON), "Content-Type: application/json");
        assert!(content_type_header("text/plain; version=0.0.4").starts_with("Content-Type: text/plain"));
    }
}
