//! # Submission Events
//!
//! Fire-and-forget notifications of terminal attempt outcomes, for open UI
//! sessions and other observers. No delivery guarantee: a slow or absent
//! subscriber never holds up a submission.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use fotara_core::DocumentStatus;

/// `{document_ref, status}` after an attempt reached `Success` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionEvent {
    pub document_ref: String,
    pub tenant_ref: String,
    pub status: DocumentStatus,
}

/// Trait for emitting submission events.
pub trait SubmissionEventEmitter: Send + Sync {
    fn emit(&self, event: &SubmissionEvent);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl SubmissionEventEmitter for NoOpEmitter {
    fn emit(&self, _event: &SubmissionEvent) {}
}

/// Emitter backed by a `tokio::sync::broadcast` channel.
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    tx: broadcast::Sender<SubmissionEvent>,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        BroadcastEmitter { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SubmissionEvent> {
        self.tx.subscribe()
    }
}

impl SubmissionEventEmitter for BroadcastEmitter {
    fn emit(&self, event: &SubmissionEvent) {
        // Err only means nobody is listening
        if self.tx.send(event.clone()).is_err() {
            trace!(document_ref = %event.document_ref, "No subscribers for submission event");
        }
    }
}
