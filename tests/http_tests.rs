mod common;

use botgate::domain::state::ControllerState;
use botgate::domain::worker::WorkerId;
use botgate::infrastructure::in_memory::InMemoryBalanceSource;
use common::{spawn_app, spawn_app_with};
use reqwest::StatusCode;
use rust_decimal_macros::dec;
use serde_json::{Value, json};

const KEY: &str = "test-key";

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

async fn post(url: String, body: Value) -> (StatusCode, Value) {
    let response = client()
        .post(url)
        .header("x-api-key", KEY)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

async fn get(url: String) -> (StatusCode, Value) {
    let response = client()
        .get(url)
        .header("x-api-key", KEY)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_missing_or_wrong_key_is_forbidden() {
    let app = spawn_app(Some(KEY)).await;

    let response = client()
        .get(format!("{}/status", app.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(body["detail"], "Unauthorized request");

    let response = client()
        .post(format!("{}/api/start", app.base_url))
        .header("x-api-key", "wrong")
        .json(&json!({ "wallet": "w" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.supervisor.spawn_calls(), 0);
}

#[tokio::test]
async fn test_no_key_configured_allows_requests() {
    let app = spawn_app(None).await;

    let response = client()
        .get(format!("{}/status", app.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_status_reports_idle() {
    let app = spawn_app(Some(KEY)).await;

    let (status, body) = get(format!("{}/status", app.base_url)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], true);
    assert_eq!(body["state"], "idle");
    assert!(body["worker"].is_null());
}

#[tokio::test]
async fn test_start_requires_wallet() {
    let app = spawn_app(Some(KEY)).await;

    for body in [json!({}), json!({ "wallet": "  " })] {
        let (status, body) = post(format!("{}/api/start", app.base_url), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_field");
        assert_eq!(body["detail"], "Missing wallet address");
    }
    assert_eq!(app.supervisor.spawn_calls(), 0);
}

#[tokio::test]
async fn test_underpaid_split_is_rejected_with_verification() {
    let app = spawn_app(Some(KEY)).await;
    app.balances.set("U60", dec!(0.0005)).await;
    app.balances.set("U20", dec!(0.0003)).await;

    let (status, body) = post(
        format!("{}/api/start", app.base_url),
        json!({ "wallet": "bc1qcaller" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "payment_not_verified");
    assert_eq!(body["verification"]["valid"], false);
    assert_eq!(body["verification"]["code"], "share_out_of_tolerance");
    let reason = body["verification"]["reason"].as_str().unwrap();
    assert!(reason.contains("U60"), "{reason}");
    assert!(reason.contains("U20"), "{reason}");
    assert!(!reason.contains("R20"), "{reason}");

    assert_eq!(app.controller.current_state(), ControllerState::Idle);
    assert_eq!(app.supervisor.spawn_calls(), 0);
}

#[tokio::test]
async fn test_start_then_duplicate_start() {
    let app = spawn_app(Some(KEY)).await;

    let (status, body) = post(
        format!("{}/api/start", app.base_url),
        json!({ "wallet": "bc1qcaller" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["worker"]["started_by"], "bc1qcaller");

    let (status, body) = post(
        format!("{}/api/start", app.base_url),
        json!({ "wallet": "bc1qother" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "already_active");

    let (_, body) = get(format!("{}/status", app.base_url)).await;
    assert_eq!(body["state"], "running");
    assert_eq!(body["worker"]["started_by"], "bc1qcaller");
    assert_eq!(app.supervisor.spawn_calls(), 1);
}

#[tokio::test]
async fn test_stop_lifecycle() {
    let app = spawn_app(Some(KEY)).await;

    let (status, body) = post(format!("{}/api/stop", app.base_url), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "not_active");

    let (_, started) = post(
        format!("{}/api/start", app.base_url),
        json!({ "wallet": "bc1qcaller" }),
    )
    .await;
    let id = WorkerId(started["worker"]["id"].as_u64().unwrap());

    let (status, body) = post(format!("{}/api/stop", app.base_url), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = get(format!("{}/status", app.base_url)).await;
    assert_eq!(body["state"], "stopping");

    app.supervisor.exit(id, None);
    let mut state = app.controller.watch_state();
    state
        .wait_for(|s| *s == ControllerState::Idle)
        .await
        .unwrap();

    let (_, body) = get(format!("{}/status", app.base_url)).await;
    assert_eq!(body["state"], "idle");
    assert!(body["worker"].is_null());
}

#[tokio::test]
async fn test_spawn_failure_is_internal_error() {
    let app = spawn_app(Some(KEY)).await;
    app.supervisor.fail_spawn(true);

    let (status, body) = post(
        format!("{}/api/start", app.base_url),
        json!({ "wallet": "bc1qcaller" }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "spawn_failed");
    assert_eq!(app.controller.current_state(), ControllerState::Idle);
}

#[tokio::test]
async fn test_unconfigured_balance_is_bad_gateway() {
    let balances = InMemoryBalanceSource::new();
    balances.set("U60", dec!(0.0006)).await;
    let app = spawn_app_with(Some(KEY), balances).await;

    let (status, body) = post(
        format!("{}/api/start", app.base_url),
        json!({ "wallet": "bc1qcaller" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "not_configured");

    let (status, _) = get(format!("{}/api/balances", app.base_url)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(app.supervisor.spawn_calls(), 0);
}

#[tokio::test]
async fn test_balances_and_verify() {
    let app = spawn_app(Some(KEY)).await;

    let (status, body) = get(format!("{}/api/balances", app.base_url)).await;
    assert_eq!(status, StatusCode::OK);
    let labels: Vec<&str> = body["observations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, ["R20", "U20", "U60"]);

    let (status, body) = get(format!("{}/api/verify", app.base_url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert!(body.get("reason").is_none());

    // Verification alone never launches anything.
    assert_eq!(app.supervisor.spawn_calls(), 0);
    assert_eq!(app.controller.current_state(), ControllerState::Idle);
}

#[tokio::test]
async fn test_profit_reports() {
    let app = spawn_app(Some(KEY)).await;

    let (status, body) = post(
        format!("{}/api/profits", app.base_url),
        json!({ "amount": "0.015", "note": "first run", "reported_by": "ops" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert_eq!(body["currency"], "BTC");

    post(
        format!("{}/api/profits", app.base_url),
        json!({ "amount": "0.005" }),
    )
    .await;

    let (status, body) = get(format!("{}/api/profits", app.base_url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reports"].as_array().unwrap().len(), 2);
    assert_eq!(body["reports"][1]["reported_by"], "anonymous");
    assert_eq!(body["total"], "0.020");
}

#[tokio::test]
async fn test_invalid_profit_reports_are_bad_requests() {
    let app = spawn_app(Some(KEY)).await;

    for report in [json!({ "amount": "-1" }), json!({ "note": "no amount" })] {
        let (status, body) = post(format!("{}/api/profits", app.base_url), report).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "invalid_report");
        assert!(body["detail"].as_str().unwrap().starts_with("Invalid profit report"));
    }

    let (status, body) = post(
        format!("{}/api/profits", app.base_url),
        json!({ "amount": "-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["detail"]
            .as_str()
            .unwrap()
            .contains("Amount must be positive")
    );

    let (_, body) = get(format!("{}/api/profits", app.base_url)).await;
    assert!(body["reports"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_non_json_start_body_is_bad_request() {
    let app = spawn_app(Some(KEY)).await;

    let response = client()
        .post(format!("{}/api/start", app.base_url))
        .header("x-api-key", KEY)
        .header("content-type", "text/plain")
        .body("wallet=bc1qcaller")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "invalid_body");

    let response = client()
        .post(format!("{}/api/start", app.base_url))
        .header("x-api-key", KEY)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_body");
    assert_eq!(app.supervisor.spawn_calls(), 0);
}
