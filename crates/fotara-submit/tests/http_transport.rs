//! HttpTransport against a mock government endpoint.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::Secret;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fotara_db::TenantCredentials;
use fotara_submit::{FiscalTransport, HttpTransport, SubmitError};

const XML: &str = "<Invoice><cbc:ID>ACME-2024-03-01-00001</cbc:ID></Invoice>";

fn credentials() -> TenantCredentials {
    TenantCredentials {
        client_id: "client-1".into(),
        secret_key: Secret::new("s3cret".into()),
    }
}

async fn transport(server: &MockServer) -> HttpTransport {
    HttpTransport::new(
        format!("{}/core/invoices/", server.uri()),
        Duration::from_secs(2),
    )
    .unwrap()
}

#[tokio::test]
async fn test_accepted_submission_returns_qr() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/core/invoices/"))
        .and(header("Client-Id", "client-1"))
        .and(header("Secret-Key", "s3cret"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({ "invoice": STANDARD.encode(XML) })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "EINV_RESULTS": { "status": "PASS", "ERRORS": [] },
            "EINV_QR": "QR-DATA"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let exchange = transport(&server).await.send(XML, &credentials()).await;
    assert_eq!(exchange.result.unwrap(), "QR-DATA");
    assert_eq!(exchange.response_body.unwrap()["EINV_QR"], "QR-DATA");
}

#[tokio::test]
async fn test_error_status_joins_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "EINV_RESULTS": {
                "status": "ERROR",
                "ERRORS": [
                    { "EINV_MESSAGE": "Invalid seller" },
                    { "EINV_MESSAGE": "Invalid total" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let exchange = transport(&server).await.send(XML, &credentials()).await;
    match exchange.result.unwrap_err() {
        SubmitError::EndpointRejected {
            message,
            duplicate_counter,
        } => {
            assert_eq!(message, "Invalid seller\nInvalid total");
            assert!(!duplicate_counter);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let exchange = transport(&server).await.send(XML, &credentials()).await;
    let err = exchange.result.unwrap_err();
    assert!(matches!(err, SubmitError::TransportFailure(_)));
    assert!(err.is_retryable());
    assert_eq!(
        exchange.response_body.unwrap()["raw_response"],
        "upstream unavailable"
    );
}

#[tokio::test]
async fn test_client_error_message_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "Malformed invoice" })),
        )
        .mount(&server)
        .await;

    let exchange = transport(&server).await.send(XML, &credentials()).await;
    let err = exchange.result.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(err.kind(), "endpoint_rejected");
    assert!(err.to_string().contains("Malformed invoice"));
}

#[tokio::test]
async fn test_duplicate_counter_is_flagged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "error": "Duplicate ICV 100" })),
        )
        .mount(&server)
        .await;

    let err = transport(&server)
        .await
        .send(XML, &credentials())
        .await
        .result
        .unwrap_err();
    assert_eq!(err.kind(), "duplicate_counter");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "EINV_QR": "late" }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let exchange = transport(&server).await.send(XML, &credentials()).await;
    let err = exchange.result.unwrap_err();
    assert!(matches!(err, SubmitError::TransportTimeout(2)));
    assert!(err.is_retryable());
    assert!(exchange.response_body.is_none());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_failure() {
    let transport =
        HttpTransport::new("http://127.0.0.1:9/core/invoices/", Duration::from_secs(2)).unwrap();
    let err = transport
        .send(XML, &credentials())
        .await
        .result
        .unwrap_err();
    assert!(err.is_retryable());
}
