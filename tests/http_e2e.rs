//! End-to-end over a real socket: may_minihttp server on the in-memory store,
//! ureq as the client.

mod common;

use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use stockroom::config::ServerConfig;
use stockroom::server;

const BIND: &str = "127.0.0.1:18731";

fn base_url() -> &'static str {
    static STARTED: OnceLock<String> = OnceLock::new();
    STARTED.get_or_init(|| {
        let (_store, app) = common::memory_app();
        let config = ServerConfig {
            bind: BIND.to_string(),
            max_body_bytes: 4096,
            ..ServerConfig::default()
        };
        // The handle is dropped; the listener coroutine keeps running.
        server::start(Arc::new(app), &config).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        format!("http://{BIND}")
    })
}

fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(5))
        .build()
}

fn status_and_json(result: Result<ureq::Response, ureq::Error>) -> (u16, Value) {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(e) => panic!("transport error: {e}"),
    };
    let status = response.status();
    let body = response.into_string().unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body).unwrap()
    };
    (status, value)
}

#[test]
fn intake_and_checkout_over_http() {
    let base = base_url();
    let agent = agent();

    let (status, created) = status_and_json(
        agent
            .post(&format!("{base}/assets/"))
            .send_json(json!({"product_code": "HT", "name": "Headset", "owner_name": "Kai"})),
    );
    assert_eq!(status, 201);
    let tag = created["asset_tag"].as_str().unwrap().to_string();
    assert!(tag.starts_with("HT-"));
    assert_eq!(created["holder"]["id_number"], "B300");

    let (status, body) = status_and_json(
        agent
            .post(&format!("{base}/stock_transaction/"))
            .send_json(json!({"asset_tag": tag, "transaction_type": "IN"})),
    );
    assert_eq!(status, 200);
    assert_eq!(body["asset"]["holder"], Value::Null);

    let (status, history) =
        status_and_json(agent.get(&format!("{base}/stock_history/{tag}/")).call());
    assert_eq!(status, 200);
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[test]
fn csv_upload_over_http() {
    let base = base_url();
    let (status, created) = status_and_json(
        agent()
            .post(&format!("{base}/assets/"))
            .set("Content-Type", "text/csv")
            .send_string("code,name\nCV,Cable\nCV,Cable\n"),
    );
    assert_eq!(status, 201);
    assert_eq!(created.as_array().unwrap().len(), 2);
}

#[test]
fn errors_over_http() {
    let base = base_url();
    let agent = agent();

    let (status, body) = status_and_json(agent.get(&format!("{base}/assets/ZZ-999/")).call());
    assert_eq!(status, 404);
    assert!(body["error"].is_string());

    let (status, _) = status_and_json(agent.get(&format!("{base}/nowhere")).call());
    assert_eq!(status, 404);

    let (status, _) = status_and_json(agent.put(&format!("{base}/check-setting/")).call());
    assert_eq!(status, 405);

    let oversized = "x".repeat(8192);
    let (status, _) = status_and_json(
        agent
            .post(&format!("{base}/assets/"))
            .set("Content-Type", "text/csv")
            .send_string(&oversized),
    );
    assert_eq!(status, 413);
}

#[test]
fn health_over_http() {
    let base = base_url();
    let (status, body) = status_and_json(agent().get(&format!("{base}/health")).call());
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "ok"}));
}
