//! # Submission State Machine
//!
//! ```text
//!   NoIdentity ──allocate──► Identified ──build+send──► Transmitting ──► Success
//!       │                        ▲                          │
//!       │ LockTimeout            │ retry (no allocation)    │ rejected / failed
//!       ▼                        │                          ▼
//!   NoIdentity                   └───────────────────────  Error
//! ```
//!
//! Storage keeps `Pending | Queued | Success | Error`; this is the view the
//! orchestrator works with. Only [`SubmissionState::NoIdentity`] yields an
//! [`Step::Allocate`], so a document that already carries an identity can
//! never reach the allocator again.

use fotara_core::{DocumentStatus, FiscalDocument, Identity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    NoIdentity,
    Identified(Identity),
    /// Held only while one attempt is in flight; never persisted.
    Transmitting(Identity),
    Success {
        identity: Identity,
        qr_artifact: String,
    },
    Error {
        identity: Identity,
        kind: Option<String>,
        retryable: bool,
    },
}

/// What the orchestrator does next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Claim an identity first.
    Allocate,
    /// Build and send with the identity the document already has.
    Attempt(Identity),
    /// Terminal. Nothing to do.
    Done,
}

impl SubmissionState {
    /// Reads the state of a stored document.
    pub fn of(document: &FiscalDocument) -> Self {
        match (&document.identity, document.status) {
            (None, _) => SubmissionState::NoIdentity,
            (Some(identity), DocumentStatus::Success) => SubmissionState::Success {
                identity: identity.clone(),
                qr_artifact: document.qr_artifact.clone().unwrap_or_default(),
            },
            (Some(identity), DocumentStatus::Error) => SubmissionState::Error {
                identity: identity.clone(),
                kind: document.last_error_kind.clone(),
                retryable: document.last_error_retryable,
            },
            (Some(identity), _) => SubmissionState::Identified(identity.clone()),
        }
    }

    /// The next step from this state.
    pub fn next_step(&self) -> Step {
        match self {
            SubmissionState::NoIdentity => Step::Allocate,
            SubmissionState::Identified(identity)
            | SubmissionState::Transmitting(identity)
            | SubmissionState::Error { identity, .. } => Step::Attempt(identity.clone()),
            SubmissionState::Success { .. } => Step::Done,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SubmissionState::NoIdentity => None,
            SubmissionState::Identified(identity)
            | SubmissionState::Transmitting(identity)
            | SubmissionState::Success { identity, .. }
            | SubmissionState::Error { identity, .. } => Some(identity),
        }
    }

    /// `Identified` or `Error` into `Transmitting`. Other states stay put.
    pub fn begin_transmit(self) -> Self {
        match self {
            SubmissionState::Identified(identity) | SubmissionState::Error { identity, .. } => {
                SubmissionState::Transmitting(identity)
            }
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Success { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SubmissionState::NoIdentity => "no_identity",
            SubmissionState::Identified(_) => "identified",
            SubmissionState::Transmitting(_) => "transmitting",
            SubmissionState::Success { .. } => "success",
            SubmissionState::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

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

    fn identity() -> Identity {
        Identity {
            daily_id: "ACME-2024-03-01-00001".into(),
            uuid: Uuid::new_v4(),
            audit_counter: 100,
        }
    }

    #[test]
    fn test_only_no_identity_allocates() {
        let mut doc = document();
        assert_eq!(SubmissionState::of(&doc).next_step(), Step::Allocate);

        let id = identity();
        doc.identity = Some(id.clone());
        for status in [DocumentStatus::Queued, DocumentStatus::Error] {
            doc.status = status;
            assert_eq!(SubmissionState::of(&doc).next_step(), Step::Attempt(id.clone()));
        }

        doc.status = DocumentStatus::Success;
        doc.qr_artifact = Some("QR".into());
        let state = SubmissionState::of(&doc);
        assert!(state.is_terminal());
        assert_eq!(state.next_step(), Step::Done);
    }

    #[test]
    fn test_error_state_keeps_last_error() {
        let mut doc = document();
        doc.identity = Some(identity());
        doc.status = DocumentStatus::Error;
        doc.last_error_kind = Some("transport_timeout".into());
        doc.last_error_retryable = true;

        match SubmissionState::of(&doc) {
            SubmissionState::Error {
                kind, retryable, ..
            } => {
                assert_eq!(kind.as_deref(), Some("transport_timeout"));
                assert!(retryable);
            }
            other => panic!("unexpected state {}", other.name()),
        }
    }

    #[test]
    fn test_begin_transmit() {
        let id = identity();
        let state = SubmissionState::Error {
            identity: id.clone(),
            kind: None,
            retryable: true,
        }
        .begin_transmit();
        assert_eq!(state, SubmissionState::Transmitting(id));
        assert_eq!(SubmissionState::NoIdentity.begin_transmit(), SubmissionState::NoIdentity);
    }
}
