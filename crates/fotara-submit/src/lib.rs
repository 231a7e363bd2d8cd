//! # fotara-submit: Submission Pipeline
//!
//! Drives fiscal documents from the host system to the government
//! e-invoicing endpoint.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Submission Pipeline                              │
//! │                                                                         │
//! │  finalize hook (Auto) / user action (Manual) / RedriveWorker           │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  SubmissionOrchestrator                          │  │
//! │  │                                                                  │  │
//! │  │  NoIdentity ──► IdentityAllocator (tenant lock, short)           │  │
//! │  │  Identified ──► payload::build ──► ubl::render                   │  │
//! │  │  Transmitting ─► FiscalTransport (no lock, bounded timeout)      │  │
//! │  │  outcome ─────► AuditLogger (log entry first, then status)       │  │
//! │  │             └─► SubmissionEventEmitter                           │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                               │                                         │
//! │                               ▼                                         │
//! │                     FiscalStore (fotara-db)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`orchestrator`] - `submit(document_ref, mode)` and the read-only queries
//! - [`allocator`] - Identity allocation through the store's tenant lock
//! - [`state`] - Submission state machine
//! - [`transport`] - HTTP transport and response classification
//! - [`audit`] - Log-first attempt recording
//! - [`events`] - Status notifications
//! - [`redrive`] - Background redrive of retryable failures
//! - [`clock`] - Tenant calendar
//! - [`config`] - Pipeline configuration
//! - [`error`] - Error taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fotara_submit::{HttpTransport, SubmissionOrchestrator, SubmitConfig};
//!
//! let config = SubmitConfig::load(None)?;
//! let transport = HttpTransport::from_settings(&config.endpoint)?;
//! let orchestrator = SubmissionOrchestrator::from_config(store, Arc::new(transport), &config);
//!
//! let report = orchestrator.submit("SINV-0001", SubmissionMode::Manual).await?;
//! println!("{:?} {:?}", report.status, report.qr_artifact);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocator;
pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod redrive;
pub mod state;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use allocator::IdentityAllocator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{StorageBackend, SubmitConfig};
pub use error::{SubmitError, SubmitResult};
pub use events::{BroadcastEmitter, NoOpEmitter, SubmissionEvent, SubmissionEventEmitter};
pub use orchestrator::{AttemptFailure, SubmissionOrchestrator, SubmissionReport, SubmitOutcome};
pub use redrive::{RedriveHandle, RedriveWorker, SweepStats};
pub use state::SubmissionState;
pub use transport::{
    interpret_response, FiscalTransport, HttpTransport, MockReply, MockTransport,
    TransportExchange,
};
