//! # Audit Logger
//!
//! Persists one submission log entry per transmission attempt, then the
//! attempt's outcome on the document. In that order: a status change
//! without a log entry cannot happen, a log entry without a status change
//! can (when the second write fails).
//!
//! ```text
//!   attempt ──► append_log(entry) ──► record_outcome(document) ──► doc'
//!                    │ fails                 │ fails
//!                    ▼                       ▼
//!               Storage error           Storage error
//!               status untouched        entry already written
//! ```

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use fotara_core::{DocumentStatus, FiscalDocument, SubmissionLogEntry};
use fotara_db::{AttemptOutcome, FiscalStore};

use crate::error::{SubmitError, SubmitResult};

/// Everything one attempt produced.
#[derive(Debug)]
pub struct AttemptRecord<'a> {
    /// Pre-encoding XML, empty when the builder failed.
    pub raw_payload: &'a str,
    pub response_body: Option<&'a Value>,
    pub result: &'a Result<String, SubmitError>,
    pub attempted_at: DateTime<Utc>,
}

pub struct AuditLogger {
    store: Arc<dyn FiscalStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn FiscalStore>) -> Self {
        AuditLogger { store }
    }

    /// Writes the log entry, then the outcome. Returns the updated document.
    pub async fn record(
        &self,
        document: &FiscalDocument,
        attempt: &AttemptRecord<'_>,
    ) -> SubmitResult<FiscalDocument> {
        let entry = log_entry(document, attempt);

        if let Err(e) = self.store.append_log(&entry).await {
            error!(
                document_ref = %document.document_ref,
                error = %e,
                "Submission log write failed, outcome not recorded"
            );
            return Err(SubmitError::Storage(e));
        }

        let outcome = match attempt.result {
            Ok(qr) => AttemptOutcome::success(qr.clone(), attempt.attempted_at),
            Err(err) => AttemptOutcome::failure(err.kind(), err.is_retryable(), attempt.attempted_at),
        };

        let updated = self
            .store
            .record_outcome(&document.document_ref, &outcome)
            .await
            .map_err(|e| {
                warn!(
                    document_ref = %document.document_ref,
                    log_id = %entry.id,
                    error = %e,
                    "Outcome not recorded after log write"
                );
                SubmitError::from(e)
            })?;

        info!(
            document_ref = %updated.document_ref,
            status = %updated.status,
            attempts = updated.attempts,
            "Submission attempt recorded"
        );
        Ok(updated)
    }
}

fn log_entry(document: &FiscalDocument, attempt: &AttemptRecord<'_>) -> SubmissionLogEntry {
    let response_body = attempt
        .response_body
        .and_then(|v| serde_json::to_string_pretty(v).ok())
        .unwrap_or_else(|| "{}".to_string());

    let (status, error_detail) = match attempt.result {
        Ok(_) => (DocumentStatus::Success, None),
        Err(err) => (DocumentStatus::Error, Some(err.to_string())),
    };

    SubmissionLogEntry {
        id: Uuid::new_v4(),
        document_ref: document.document_ref.clone(),
        tenant_ref: document.tenant_ref.clone(),
        status,
        raw_payload: attempt.raw_payload.to_string(),
        response_body,
        error_detail,
        created_at: attempt.attempted_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> FiscalDocument {
        serde_json::from_value(json!({
            "document_ref": "SINV-1",
            "tenant_ref": "t1",
            "kind": "invoice",
            "buyer": { "name": "Walk-in" },
            "lines": []
        }))
        .unwrap()
    }

    #[test]
    fn test_failed_attempt_entry() {
        let result = Err(SubmitError::TransportTimeout(30));
        let entry = log_entry(
            &document(),
            &AttemptRecord {
                raw_payload: "<Invoice/>",
                response_body: None,
                result: &result,
                attempted_at: Utc::now(),
            },
        );

        assert_eq!(entry.status, DocumentStatus::Error);
        assert_eq!(entry.response_body, "{}");
        assert_eq!(entry.raw_payload, "<Invoice/>");
        assert!(entry.error_detail.unwrap().contains("30 seconds"));
    }

    #[test]
    fn test_accepted_attempt_entry() {
        let body = json!({ "EINV_QR": "QR" });
        let result = Ok("QR".to_string());
        let entry = log_entry(
            &document(),
            &AttemptRecord {
                raw_payload: "<Invoice/>",
                response_body: Some(&body),
                result: &result,
                attempted_at: Utc::now(),
            },
        );

        assert_eq!(entry.status, DocumentStatus::Success);
        assert!(entry.error_detail.is_none());
        assert!(entry.response_body.contains("\"EINV_QR\": \"QR\""));
    }
}
