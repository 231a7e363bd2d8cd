//! # Transport
//!
//! Sends a rendered payload to the government endpoint and classifies the
//! answer.
//!
//! ## Wire Exchange
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  POST <endpoint.url>                                                    │
//! │    Client-Id:  <tenant client id>                                       │
//! │    Secret-Key: <tenant secret>                                          │
//! │    Content-Type: application/json                                       │
//! │    {"invoice": "<base64 of the UBL XML>"}                               │
//! │                                                                         │
//! │  Response                          Classification                       │
//! │  ────────────────────────────────  ─────────────────────────────────    │
//! │  timeout                           TransportTimeout   (retryable)       │
//! │  connect / read failure            TransportFailure   (retryable)       │
//! │  5xx, 429                          TransportFailure   (retryable)       │
//! │  other non-2xx                     EndpointRejected   message|error     │
//! │  2xx, EINV_RESULTS.status=ERROR    EndpointRejected   ERRORS joined     │
//! │  2xx otherwise                     accepted, artifact = EINV_QR         │
//! │                                                                         │
//! │  A body that is not JSON is kept as {"raw_response": "<text>"}.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use fotara_db::TenantCredentials;

use crate::config::EndpointSettings;
use crate::error::{SubmitError, SubmitResult};

// =============================================================================
// Transport Trait
// =============================================================================

/// What came back from one transmission.
#[derive(Debug)]
pub struct TransportExchange {
    /// Parsed response body, `None` when no response arrived.
    pub response_body: Option<Value>,
    /// Verification artifact on acceptance.
    pub result: Result<String, SubmitError>,
}

impl TransportExchange {
    pub fn failed(err: SubmitError) -> Self {
        TransportExchange {
            response_body: None,
            result: Err(err),
        }
    }
}

/// Delivery of rendered payloads to the endpoint.
#[async_trait]
pub trait FiscalTransport: Send + Sync {
    /// Sends the pre-encoding XML. Never panics and never returns early:
    /// every outcome is folded into the exchange so it can be logged.
    async fn send(&self, xml: &str, credentials: &TenantCredentials) -> TransportExchange;
}

// =============================================================================
// HTTP Transport
// =============================================================================

pub struct HttpTransport {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> SubmitResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubmitError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(HttpTransport {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub fn from_settings(settings: &EndpointSettings) -> SubmitResult<Self> {
        Self::new(
            settings.url.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }
}

#[async_trait]
impl FiscalTransport for HttpTransport {
    async fn send(&self, xml: &str, credentials: &TenantCredentials) -> TransportExchange {
        let body = json!({ "invoice": STANDARD.encode(xml.as_bytes()) });

        let response = match self
            .client
            .post(&self.url)
            .header("Client-Id", &credentials.client_id)
            .header("Secret-Key", credentials.secret_key.expose_secret())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(url = %self.url, "Endpoint timed out");
                return TransportExchange::failed(SubmitError::TransportTimeout(
                    self.timeout.as_secs(),
                ));
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "Endpoint unreachable");
                return TransportExchange::failed(SubmitError::TransportFailure(e.to_string()));
            }
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) if e.is_timeout() => {
                return TransportExchange::failed(SubmitError::TransportTimeout(
                    self.timeout.as_secs(),
                ));
            }
            Err(e) => {
                return TransportExchange::failed(SubmitError::TransportFailure(format!(
                    "Failed to read response: {}",
                    e
                )));
            }
        };

        debug!(status, bytes = text.len(), "Endpoint answered");
        interpret_response(status, &text)
    }
}

// =============================================================================
// Response Classification
// =============================================================================

/// Classifies an endpoint answer.
pub fn interpret_response(status: u16, body: &str) -> TransportExchange {
    let value: Value =
        serde_json::from_str(body).unwrap_or_else(|_| json!({ "raw_response": body }));

    let result = if !(200..300).contains(&status) {
        let message = value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("API returned status {}", status));

        if status >= 500 || status == 429 {
            Err(SubmitError::TransportFailure(message))
        } else {
            Err(rejection(message))
        }
    } else {
        let results = value.get("EINV_RESULTS");
        let outcome = results
            .and_then(|r| r.get("status"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        if outcome.eq_ignore_ascii_case("ERROR") {
            let messages: Vec<&str> = results
                .and_then(|r| r.get("ERRORS"))
                .and_then(Value::as_array)
                .map(|errors| {
                    errors
                        .iter()
                        .filter_map(|e| e.get("EINV_MESSAGE").and_then(Value::as_str))
                        .collect()
                })
                .unwrap_or_default();

            let message = if messages.is_empty() {
                "Endpoint reported an error".to_string()
            } else {
                messages.join("\n")
            };
            Err(rejection(message))
        } else {
            Ok(value
                .get("EINV_QR")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string())
        }
    };

    TransportExchange {
        response_body: Some(value),
        result,
    }
}

fn rejection(message: String) -> SubmitError {
    SubmitError::EndpointRejected {
        duplicate_counter: message.to_lowercase().contains("duplicate"),
        message,
    }
}

// =============================================================================
// Mock Transport
// =============================================================================

/// Scripted answer of the [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Accept(String),
    Reject(String),
    Fail(String),
    Timeout,
}

/// In-process transport for tests and local runs.
///
/// Plays queued replies in order, then accepts everything with a
/// generated artifact.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockReply>>,
    sent: Mutex<Vec<String>>,
    send_count: AtomicU64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: MockReply) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    /// XML of every payload sent so far.
    pub fn sent_payloads(&self) -> Vec<String> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl FiscalTransport for MockTransport {
    async fn send(&self, xml: &str, _credentials: &TenantCredentials) -> TransportExchange {
        let n = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(xml.to_string());

        let reply = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| MockReply::Accept(format!("mock-qr-{}", n)));

        debug!(n, ?reply, "[MOCK] payload would be sent");

        match reply {
            MockReply::Accept(qr) => interpret_response(
                200,
                &json!({ "EINV_RESULTS": { "status": "PASS" }, "EINV_QR": qr }).to_string(),
            ),
            MockReply::Reject(message) => interpret_response(
                200,
                &json!({
                    "EINV_RESULTS": {
                        "status": "ERROR",
                        "ERRORS": [{ "EINV_MESSAGE": message }]
                    }
                })
                .to_string(),
            ),
            MockReply::Fail(message) => {
                interpret_response(503, &json!({ "message": message }).to_string())
            }
            MockReply::Timeout => TransportExchange::failed(SubmitError::TransportTimeout(30)),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
