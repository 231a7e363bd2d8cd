//! Gateway routes against the in-memory store and the mock transport.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{FixedOffset, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

use fotara_db::MemoryStore;
use fotara_gateway::{build_router, AppState};
use fotara_submit::{ManualClock, MockReply, MockTransport, SubmissionOrchestrator};

fn app() -> (Router, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let orchestrator = SubmissionOrchestrator::new(
        Arc::new(MemoryStore::new()),
        transport.clone(),
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            FixedOffset::east_opt(3 * 3600).unwrap(),
        )),
        Duration::from_secs(1),
    );
    (build_router(AppState::new(Arc::new(orchestrator))), transport)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn tenant_body(enabled: bool) -> Value {
    json!({
        "config": {
            "tenant_ref": "t1",
            "abbreviation": "ACME",
            "enabled": enabled,
            "auto_send_on_finalize": true,
            "seller": { "name": "Acme Trading", "tax_id": "12345678" }
        },
        "credentials": { "client_id": "client", "secret_key": "secret" },
        "starter_counter": 99
    })
}

fn document_body(document_ref: &str) -> Value {
    json!({
        "document_ref": document_ref,
        "tenant_ref": "t1",
        "kind": "invoice",
        "finalized": true,
        "is_pos": true,
        "buyer": { "name": "Walk-in" },
        "lines": [{
            "name": "Tea",
            "quantity": "3",
            "unit_price": "0.335",
            "uom": "Nos",
            "tax_rate": "0",
            "tax_category": "zero_exempt"
        }]
    })
}

async fn onboard(app: &Router) {
    let (status, _) = call(app, "PUT", "/v1/tenants/t1", Some(tenant_body(true))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(
        app,
        "PUT",
        "/v1/documents/SINV-1",
        Some(document_body("SINV-1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_tenant_roundtrip_hides_credentials() {
    let (app, _) = app();
    let (status, body) = call(&app, "PUT", "/v1/tenants/t1", Some(tenant_body(true))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_credentials"], true);
    assert_eq!(body["counters"]["starter_counter"], 99);
    assert!(body.get("credentials").is_none());

    let (status, body) = call(&app, "GET", "/v1/tenants/t1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["abbreviation"], "ACME");
}

#[tokio::test]
async fn test_tenant_path_must_match_body() {
    let (app, _) = app();
    let (status, body) = call(&app, "PUT", "/v1/tenants/other", Some(tenant_body(true))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_submit_then_query() {
    let (app, _) = app();
    onboard(&app).await;

    let (status, report) = call(
        &app,
        "POST",
        "/v1/documents/SINV-1/submit",
        Some(json!({ "mode": "manual" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["outcome"], "submitted");
    assert_eq!(report["status"], "success");
    assert_eq!(report["identity"]["audit_counter"], 100);
    assert_eq!(report["identity"]["daily_id"], "ACME-2024-03-01-00001");

    let (status, projection) = call(&app, "GET", "/v1/documents/SINV-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(projection["audit_counter"], 100);
    assert_eq!(projection["qr_artifact"], "mock-qr-1");

    let (_, logs) = call(&app, "GET", "/v1/documents/SINV-1/logs", None).await;
    assert_eq!(logs.as_array().unwrap().len(), 1);

    let (_, body) = call(&app, "GET", "/v1/documents/SINV-1/cancellable", None).await;
    assert_eq!(body["cancellable"], false);

    // Content is frozen once identified
    let (status, body) = call(
        &app,
        "PUT",
        "/v1/documents/SINV-1",
        Some(document_body("SINV-1")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "IMMUTABLE");
}

#[tokio::test]
async fn test_attempt_failure_is_reported_not_raised() {
    let (app, transport) = app();
    onboard(&app).await;
    transport.push(MockReply::Fail("gateway down".into()));

    let (status, report) = call(&app, "POST", "/v1/documents/SINV-1/submit", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "error");
    assert_eq!(report["error"]["kind"], "transport_failure");
    assert_eq!(report["error"]["retryable"], true);

    let (_, body) = call(&app, "GET", "/v1/documents/SINV-1/cancellable", None).await;
    assert_eq!(body["cancellable"], true);
}

#[tokio::test]
async fn test_auto_mode_is_skipped_for_disabled_tenant() {
    let (app, _) = app();
    let (status, _) = call(&app, "PUT", "/v1/tenants/t1", Some(tenant_body(false))).await;
    assert_eq!(status, StatusCode::OK);
    call(
        &app,
        "PUT",
        "/v1/documents/SINV-1",
        Some(document_body("SINV-1")),
    )
    .await;

    let (status, report) = call(
        &app,
        "POST",
        "/v1/documents/SINV-1/submit",
        Some(json!({ "mode": "auto" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["outcome"], "skipped");

    let (status, body) = call(&app, "POST", "/v1/documents/SINV-1/submit", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "TENANT_DISABLED");
}

#[tokio::test]
async fn test_unknown_document() {
    let (app, _) = app();
    let (status, body) = call(&app, "GET", "/v1/documents/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_document_is_unprocessable() {
    let (app, _) = app();
    call(&app, "PUT", "/v1/tenants/t1", Some(tenant_body(true))).await;

    let mut body = document_body("SINV-1");
    body["lines"] = json!([]);
    let (status, body) = call(&app, "PUT", "/v1/documents/SINV-1", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION");
}

#[tokio::test]
async fn test_control_characters_are_refused_at_intake() {
    let (app, _) = app();
    call(&app, "PUT", "/v1/tenants/t1", Some(tenant_body(true))).await;

    let mut body = document_body("SINV-1");
    body["lines"][0]["name"] = json!("Tea\u{1}");
    let (status, body) = call(&app, "PUT", "/v1/documents/SINV-1", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION");
    assert!(body["message"].as_str().unwrap().contains("lines[0].name"));
}

#[tokio::test]
async fn test_tax_category_may_be_omitted() {
    let (app, _) = app();
    call(&app, "PUT", "/v1/tenants/t1", Some(tenant_body(true))).await;

    let mut body = document_body("SINV-1");
    body["lines"][0]
        .as_object_mut()
        .unwrap()
        .remove("tax_category");
    let (status, _) = call(&app, "PUT", "/v1/documents/SINV-1", Some(body)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "POST", "/v1/documents/SINV-1/submit", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
}
