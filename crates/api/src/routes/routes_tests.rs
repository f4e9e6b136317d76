//! Router tests over the in-memory billing store

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use billhook_billing::{signature::sign, MemoryStore, PaddleConfig};
use billhook_shared::TenantId;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tower::ServiceExt;

use crate::{auth::ActiveOrganisation, routes::create_router, state::AppState};

const SECRET: &str = "pdl_ntfset_router_tests";

fn store() -> MemoryStore {
    MemoryStore::new()
        .with_plan("free", "Free", 0, None)
        .with_plan("pro", "Pro", 2900, Some("price_9"))
        .with_tenant("org_1", "free")
}

fn app_with_secret(secret: &str) -> Router {
    let paddle = PaddleConfig {
        webhook_secret: secret.to_string(),
        api_key_configured: true,
        ..PaddleConfig::default()
    };
    create_router(AppState::with_store(&paddle, Arc::new(store())))
}

fn app() -> Router {
    app_with_secret(SECRET)
}

fn webhook_request(body: &str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/paddle")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("Paddle-Signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn signed(body: &str) -> Option<String> {
    sign(OffsetDateTime::now_utc().unix_timestamp(), body.as_bytes(), SECRET)
}

fn org_request(uri: &str, org: Option<&str>) -> Request<Body> {
    let mut request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    if let Some(org) = org {
        request
            .extensions_mut()
            .insert(ActiveOrganisation(TenantId::parse(org).unwrap()));
    }
    request
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn evt_1() -> String {
    json!({
        "event_id": "evt_1",
        "event_type": "subscription.updated",
        "data": {
            "custom_data": {"organisation_id": "org_1"},
            "status": "active",
            "next_billed_at": "2025-01-01T00:00:00Z",
            "items": [{"price": {"id": "price_9"}}]
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_health() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["webhooks_configured"], true);
}

#[tokio::test]
async fn test_webhook_processed_then_already_processed() {
    let app = app();
    let body = evt_1();

    let response = app
        .clone()
        .oneshot(webhook_request(&body, signed(&body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["message"], "Webhook processed successfully");
    assert_eq!(json["data"]["outcome"], "processed");
    assert_eq!(json["data"]["event_id"], "evt_1");

    let response = app
        .clone()
        .oneshot(webhook_request(&body, signed(&body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["outcome"], "already_processed");

    // The overview reflects the single applied update
    let response = app
        .oneshot(org_request("/v1/billing", Some("org_1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["billing"]["plan_id"], "pro");
    assert_eq!(json["data"]["billing"]["subscription_status"], "active");
    assert_eq!(
        json["data"]["billing"]["current_period_ends_at"],
        "2025-01-01T00:00:00Z"
    );
    assert_eq!(json["data"]["billing"]["billing_enabled"], true);
}

#[tokio::test]
async fn test_webhook_signature_failures_are_401() {
    let body = evt_1();

    let response = app().oneshot(webhook_request(&body, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let stale = sign(
        OffsetDateTime::now_utc().unix_timestamp() - 301,
        body.as_bytes(),
        SECRET,
    );
    let response = app().oneshot(webhook_request(&body, stale)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let tampered = body.replace("active", "paused");
    let response = app()
        .oneshot(webhook_request(&tampered, signed(&body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_malformed_payloads_are_400() {
    for body in [
        "{not json".to_string(),
        json!({"event_type": "subscription.updated"}).to_string(),
        json!({"event_id": "evt_1", "event_type": "  "}).to_string(),
    ] {
        let response = app()
            .oneshot(webhook_request(&body, signed(&body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body = {}", body);
    }
}

#[tokio::test]
async fn test_webhook_unconfigured_is_503() {
    let body = evt_1();
    let response = app_with_secret("")
        .oneshot(webhook_request(&body, signed(&body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_webhook_reconciliation_failure_is_500() {
    let body = json!({
        "event_id": "evt_fk",
        "event_type": "transaction.completed",
        "data": {"id": "txn_1", "custom_data": {"organisation_id": "org_missing"}}
    })
    .to_string();

    let response = app()
        .oneshot(webhook_request(&body, signed(&body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["error"], "Internal server error");
}

#[tokio::test]
async fn test_webhook_unmatched_event_is_ignored() {
    let body = json!({
        "event_id": "evt_2",
        "event_type": "customer.updated",
        "data": {"id": "ctm_1"}
    })
    .to_string();

    let response = app()
        .oneshot(webhook_request(&body, signed(&body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["outcome"], "ignored");
}

#[tokio::test]
async fn test_billing_routes_require_active_organisation() {
    for uri in ["/v1/billing", "/v1/billing/invoices"] {
        let response = app().oneshot(org_request(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "uri = {}", uri);
    }
}

#[tokio::test]
async fn test_invoice_list_after_transaction() {
    let app = app();
    let body = json!({
        "event_id": "evt_txn",
        "event_type": "transaction.completed",
        "data": {
            "id": "txn_1",
            "status": "completed",
            "currency_code": "usd",
            "details": {"totals": {"grand_total": "2900"}, "invoice_number": "INV-7"},
            "billed_at": "2025-01-02T03:04:05Z",
            "invoice_url": "https://example.test/inv/7",
            "custom_data": {"organisation_id": "org_1"}
        }
    })
    .to_string();

    let response = app
        .clone()
        .oneshot(webhook_request(&body, signed(&body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(org_request("/v1/billing/invoices", Some("org_1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["message"], "Invoices retrieved successfully");
    assert_eq!(
        json["data"]["invoices"],
        json!([{
            "status": "completed",
            "currency_code": "USD",
            "total_amount_cents": 2900,
            "invoice_number": "INV-7",
            "invoice_url": "https://example.test/inv/7",
            "invoice_available": true,
            "billed_at": "2025-01-02",
            "billed_at_timestamp": "2025-01-02T03:04:05Z"
        }])
    );
}

#[tokio::test]
async fn test_overview_unknown_organisation_is_404() {
    let response = app()
        .oneshot(org_request("/v1/billing", Some("org_unknown")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
