//! # Submission Orchestrator
//!
//! Entry point of the pipeline: `submit(document_ref, mode)`.
//!
//! ## Submission Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        submit(document_ref, mode)                       │
//! │                                                                         │
//! │  load document ──► Success? ──yes──► AlreadySubmitted (no writes)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  entry rules    Auto + disabled/auto-send off ──► Skipped              │
//! │                 Manual + disabled ──────────────► TenantDisabled       │
//! │                 not finalized ──────────────────► DocumentNotFinalized │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  NoIdentity? ──yes──► credit note reversal check (no counter burned)   │
//! │       │               allocate under tenant lock ── LockTimeout        │
//! │       ▼                                                                 │
//! │  Identified / Error ──► Transmitting (no lock held)                     │
//! │       build payload ── builder error ─┐                                │
//! │       render UBL                      │                                │
//! │       send ── rejected / failed ──────┤                                │
//! │       │                               ▼                                │
//! │       ▼                         log entry ──► status Error             │
//! │  log entry ──► status Success + artifact                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  emit {document_ref, status}                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use fotara_core::payload::{self, BuildContext};
use fotara_core::validation::{validate_document, validate_tenant};
use fotara_core::{
    ubl, DocumentProjection, DocumentStatus, FiscalDocument, Identity, SubmissionLogEntry,
    SubmissionMode, ValidationError,
};
use fotara_db::{FiscalStore, TenantRecord, TenantUpsert};

use crate::allocator::IdentityAllocator;
use crate::audit::{AttemptRecord, AuditLogger};
use crate::clock::{Clock, SystemClock};
use crate::config::SubmitConfig;
use crate::error::{SubmitError, SubmitResult};
use crate::events::{NoOpEmitter, SubmissionEvent, SubmissionEventEmitter};
use crate::state::{SubmissionState, Step};
use crate::transport::{FiscalTransport, TransportExchange};

// =============================================================================
// Submission Report
// =============================================================================

/// How a `submit` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// An attempt was made; see `status` and `error`.
    Submitted,
    /// The document was already accepted. Nothing happened.
    AlreadySubmitted,
    /// Auto trigger for a tenant that opted out. Nothing happened.
    Skipped,
}

/// The failure of an attempt, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptFailure {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&SubmitError> for AttemptFailure {
    fn from(err: &SubmitError) -> Self {
        AttemptFailure {
            kind: err.kind().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Result of one `submit` call.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport {
    pub document_ref: String,
    pub outcome: SubmitOutcome,
    /// True when this call issued the identity.
    pub fresh_identity: bool,
    pub identity: Option<Identity>,
    pub status: DocumentStatus,
    pub qr_artifact: Option<String>,
    pub error: Option<AttemptFailure>,
}

impl SubmissionReport {
    fn new(
        document: &FiscalDocument,
        outcome: SubmitOutcome,
        fresh_identity: bool,
        error: Option<&SubmitError>,
    ) -> Self {
        SubmissionReport {
            document_ref: document.document_ref.clone(),
            outcome,
            fresh_identity,
            identity: document.identity.clone(),
            status: document.status,
            qr_artifact: document.qr_artifact.clone(),
            error: error.map(AttemptFailure::from),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DocumentStatus::Success
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct SubmissionOrchestrator {
    store: Arc<dyn FiscalStore>,
    allocator: IdentityAllocator,
    transport: Arc<dyn FiscalTransport>,
    audit: AuditLogger,
    emitter: Arc<dyn SubmissionEventEmitter>,
    clock: Arc<dyn Clock>,
}

impl SubmissionOrchestrator {
    pub fn new(
        store: Arc<dyn FiscalStore>,
        transport: Arc<dyn FiscalTransport>,
        clock: Arc<dyn Clock>,
        lock_wait: Duration,
    ) -> Self {
        SubmissionOrchestrator {
            allocator: IdentityAllocator::new(store.clone(), clock.clone(), lock_wait),
            audit: AuditLogger::new(store.clone()),
            emitter: Arc::new(NoOpEmitter),
            store,
            transport,
            clock,
        }
    }

    /// Builds an orchestrator on the system clock in the configured calendar.
    pub fn from_config(
        store: Arc<dyn FiscalStore>,
        transport: Arc<dyn FiscalTransport>,
        config: &SubmitConfig,
    ) -> Self {
        Self::new(
            store,
            transport,
            Arc::new(SystemClock::new(config.utc_offset())),
            config.lock_wait(),
        )
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SubmissionEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn store(&self) -> Arc<dyn FiscalStore> {
        self.store.clone()
    }

    // =========================================================================
    // Intake
    // =========================================================================

    /// Onboards a tenant or updates its settings.
    pub async fn upsert_tenant(&self, upsert: &TenantUpsert) -> SubmitResult<TenantRecord> {
        validate_tenant(&upsert.config)?;
        if upsert.starter_counter < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "starter_counter".into(),
            }
            .into());
        }
        Ok(self.store.upsert_tenant(upsert).await?)
    }

    /// Stores a host document. Refused once the document has an identity.
    pub async fn upsert_document(&self, document: &FiscalDocument) -> SubmitResult<FiscalDocument> {
        validate_document(document)?;
        if self.store.get_tenant(&document.tenant_ref).await?.is_none() {
            return Err(SubmitError::not_found("Tenant", &document.tenant_ref));
        }
        Ok(self.store.upsert_document(document).await?)
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Drives a document as far as it can go in one attempt.
    ///
    /// Failures of the attempt itself (builder, credentials, transport,
    /// endpoint) are persisted and returned inside the report. Failures
    /// before the attempt are returned as errors and leave nothing behind.
    ///
    /// ## Errors
    /// - `NotFound`: document or tenant unknown
    /// - `TenantDisabled`, `DocumentNotFinalized`: entry rules
    /// - `Build(MissingReversalReference)`: credit note refused before allocation
    /// - `LockTimeout`: allocation did not get the tenant lock; retryable
    /// - `Storage`: including a failed log write, in which case no status
    ///   was recorded
    pub async fn submit(
        &self,
        document_ref: &str,
        mode: SubmissionMode,
    ) -> SubmitResult<SubmissionReport> {
        let document = self.load_document(document_ref).await?;
        let state = SubmissionState::of(&document);

        if state.is_terminal() {
            debug!(document_ref, "Already submitted");
            return Ok(SubmissionReport::new(
                &document,
                SubmitOutcome::AlreadySubmitted,
                false,
                None,
            ));
        }

        let tenant = self
            .store
            .get_tenant(&document.tenant_ref)
            .await?
            .ok_or_else(|| SubmitError::not_found("Tenant", &document.tenant_ref))?;

        match mode {
            SubmissionMode::Auto
                if !tenant.config.enabled || !tenant.config.auto_send_on_finalize =>
            {
                debug!(document_ref, tenant_ref = %tenant.config.tenant_ref, "Auto submission off");
                return Ok(SubmissionReport::new(
                    &document,
                    SubmitOutcome::Skipped,
                    false,
                    None,
                ));
            }
            SubmissionMode::Manual if !tenant.config.enabled => {
                return Err(SubmitError::TenantDisabled {
                    tenant_ref: tenant.config.tenant_ref.clone(),
                });
            }
            _ => {}
        }

        if !document.finalized {
            return Err(SubmitError::DocumentNotFinalized {
                document_ref: document.document_ref.clone(),
            });
        }

        let original = self.load_original(&document).await?;

        let (state, fresh) = match state.next_step() {
            Step::Done => {
                return Ok(SubmissionReport::new(
                    &document,
                    SubmitOutcome::AlreadySubmitted,
                    false,
                    None,
                ))
            }
            Step::Allocate => {
                payload::check_reversal(&document, original.as_ref())?;
                let allocation = self
                    .allocator
                    .allocate(&document.tenant_ref, &document.document_ref)
                    .await?;
                (
                    SubmissionState::Identified(allocation.identity),
                    allocation.fresh,
                )
            }
            Step::Attempt(_) => (state, false),
        };

        let state = state.begin_transmit();
        let Some(identity) = state.identity().cloned() else {
            return Err(SubmitError::not_found("Identity", &document.document_ref));
        };
        debug!(document_ref, state = state.name(), audit_counter = identity.audit_counter, "Attempting");

        let (updated, error) = self
            .attempt(&document, &identity, &tenant, original.as_ref())
            .await?;

        Ok(SubmissionReport::new(
            &updated,
            SubmitOutcome::Submitted,
            fresh,
            error.as_ref(),
        ))
    }

    /// Builds, sends and records one attempt. Holds no lock.
    async fn attempt(
        &self,
        document: &FiscalDocument,
        identity: &Identity,
        tenant: &TenantRecord,
        original: Option<&FiscalDocument>,
    ) -> SubmitResult<(FiscalDocument, Option<SubmitError>)> {
        let attempted_at = self.clock.now();
        let ctx = BuildContext {
            tenant: &tenant.config,
            original,
            issue_date: self.clock.today(),
        };

        let rendered =
            payload::build(document, identity, &ctx).and_then(|payload| ubl::render(&payload));

        let (raw_payload, exchange) = match rendered {
            Err(e) => {
                warn!(document_ref = %document.document_ref, kind = e.kind(), error = %e, "Payload build failed");
                (String::new(), TransportExchange::failed(SubmitError::Build(e)))
            }
            Ok(xml) => {
                let exchange = match &tenant.credentials {
                    Some(credentials) => self.transport.send(&xml, credentials).await,
                    None => TransportExchange::failed(SubmitError::MissingCredentials {
                        tenant_ref: tenant.config.tenant_ref.clone(),
                    }),
                };
                (xml, exchange)
            }
        };

        let updated = self
            .audit
            .record(
                document,
                &AttemptRecord {
                    raw_payload: &raw_payload,
                    response_body: exchange.response_body.as_ref(),
                    result: &exchange.result,
                    attempted_at,
                },
            )
            .await?;

        match &exchange.result {
            Ok(_) => info!(
                document_ref = %updated.document_ref,
                daily_id = %identity.daily_id,
                audit_counter = identity.audit_counter,
                "Document accepted"
            ),
            Err(e) => warn!(
                document_ref = %updated.document_ref,
                audit_counter = identity.audit_counter,
                kind = e.kind(),
                retryable = e.is_retryable(),
                error = %e,
                "Submission attempt failed"
            ),
        }

        self.emitter.emit(&SubmissionEvent {
            document_ref: updated.document_ref.clone(),
            tenant_ref: updated.tenant_ref.clone(),
            status: updated.status,
        });

        Ok((updated, exchange.result.err()))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Settings and counters of a tenant.
    pub async fn tenant(&self, tenant_ref: &str) -> SubmitResult<TenantRecord> {
        self.store
            .get_tenant(tenant_ref)
            .await?
            .ok_or_else(|| SubmitError::not_found("Tenant", tenant_ref))
    }

    /// Read-only view of a document.
    pub async fn projection(&self, document_ref: &str) -> SubmitResult<DocumentProjection> {
        Ok(self.load_document(document_ref).await?.projection())
    }

    /// Submission log of a document, oldest first.
    pub async fn logs(&self, document_ref: &str) -> SubmitResult<Vec<SubmissionLogEntry>> {
        self.load_document(document_ref).await?;
        Ok(self.store.list_logs(document_ref).await?)
    }

    /// False once the document was accepted; a credit note is needed then.
    pub async fn cancellable(&self, document_ref: &str) -> SubmitResult<bool> {
        let document = self.load_document(document_ref).await?;
        Ok(document.status != DocumentStatus::Success)
    }

    pub async fn health(&self) -> bool {
        self.store.health_check().await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load_document(&self, document_ref: &str) -> SubmitResult<FiscalDocument> {
        self.store
            .get_document(document_ref)
            .await?
            .ok_or_else(|| SubmitError::not_found("Document", document_ref))
    }

    /// The original of a credit note, if it exists for the same tenant.
    async fn load_original(&self, document: &FiscalDocument) -> SubmitResult<Option<FiscalDocument>> {
        let Some(original_ref) = document.reversal_of.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .store
            .get_document(original_ref)
            .await?
            .filter(|o| o.tenant_ref == document.tenant_ref))
    }
}
