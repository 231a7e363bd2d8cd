//! # Fiscal Store
//!
//! The storage seam of the pipeline. Both the PostgreSQL [`Database`] and
//! the in-process [`MemoryStore`] implement [`FiscalStore`]; everything in
//! `fotara-submit` is written against the trait.
//!
//! ## Write Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Field                          Written by                              │
//! │  ─────────────────────────────  ──────────────────────────────────────  │
//! │  tenant settings, credentials   upsert_tenant                           │
//! │  tenant counters                allocate_identity   (tenant lock held)  │
//! │  document content               upsert_document     (until identified)  │
//! │  document identity              allocate_identity   (once)              │
//! │  status, artifact, last error   record_outcome      (never from Success)│
//! │  submission log                 append_log          (insert only)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Database`]: crate::pool::Database
//! [`MemoryStore`]: crate::memory::MemoryStore

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use fotara_core::{
    CounterState, DocumentStatus, FiscalDocument, Identity, SubmissionLogEntry,
    TenantFiscalConfig,
};

use crate::error::DbResult;

// =============================================================================
// Records
// =============================================================================

/// Endpoint credentials of a tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantCredentials {
    pub client_id: String,
    pub secret_key: Secret<String>,
}

/// A stored tenant: settings, counters and credentials.
#[derive(Debug, Clone)]
pub struct TenantRecord {
    pub config: TenantFiscalConfig,
    pub counters: CounterState,
    pub credentials: Option<TenantCredentials>,
}

/// Onboarding or settings update for a tenant.
///
/// `credentials: None` keeps whatever is stored. Counters other than the
/// starter are never touched by an upsert.
#[derive(Debug, Clone)]
pub struct TenantUpsert {
    pub config: TenantFiscalConfig,
    pub credentials: Option<TenantCredentials>,
    pub starter_counter: i64,
}

/// Input to [`FiscalStore::allocate_identity`].
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub tenant_ref: String,
    pub document_ref: String,
    /// Calendar date in the tenant's timezone.
    pub today: NaiveDate,
    /// Used only when a fresh identity is issued.
    pub uuid: Uuid,
    /// Upper bound on waiting for the tenant lock.
    pub lock_wait: Duration,
}

/// Result of an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationOutcome {
    pub identity: Identity,
    /// `false` when the document already had an identity.
    pub fresh: bool,
}

/// The result of one transmission attempt, as persisted on the document.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    /// `Success` or `Error`.
    pub status: DocumentStatus,
    pub qr_artifact: Option<String>,
    pub error_kind: Option<String>,
    pub retryable: bool,
    pub attempted_at: DateTime<Utc>,
}

impl AttemptOutcome {
    pub fn success(qr_artifact: String, attempted_at: DateTime<Utc>) -> Self {
        AttemptOutcome {
            status: DocumentStatus::Success,
            qr_artifact: Some(qr_artifact),
            error_kind: None,
            retryable: false,
            attempted_at,
        }
    }

    pub fn failure(kind: impl Into<String>, retryable: bool, attempted_at: DateTime<Utc>) -> Self {
        AttemptOutcome {
            status: DocumentStatus::Error,
            qr_artifact: None,
            error_kind: Some(kind.into()),
            retryable,
            attempted_at,
        }
    }
}

/// A document eligible for automatic redrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedriveCandidate {
    pub document_ref: String,
    pub tenant_ref: String,
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Store Trait
// =============================================================================

/// Durable state of the pipeline.
#[async_trait]
pub trait FiscalStore: Send + Sync {
    /// Creates or updates a tenant. Issued counters are preserved.
    async fn upsert_tenant(&self, upsert: &TenantUpsert) -> DbResult<TenantRecord>;

    async fn get_tenant(&self, tenant_ref: &str) -> DbResult<Option<TenantRecord>>;

    /// Creates or replaces a document's content.
    ///
    /// ## Errors
    /// - `ForeignKeyViolation` / `NotFound`: tenant unknown
    /// - `Immutable`: the document already has an identity
    async fn upsert_document(&self, document: &FiscalDocument) -> DbResult<FiscalDocument>;

    async fn get_document(&self, document_ref: &str) -> DbResult<Option<FiscalDocument>>;

    /// Issues the document's identity under the tenant lock, or returns the
    /// one it already has.
    ///
    /// ## Errors
    /// - `LockTimeout`: lock not acquired within `lock_wait`; nothing written
    /// - `NotFound`: tenant or document unknown
    async fn allocate_identity(&self, request: &AllocationRequest) -> DbResult<AllocationOutcome>;

    /// Persists an attempt's outcome. A document in `Success` is returned
    /// unchanged. Identity fields are never written.
    async fn record_outcome(
        &self,
        document_ref: &str,
        outcome: &AttemptOutcome,
    ) -> DbResult<FiscalDocument>;

    /// Appends one submission log entry.
    async fn append_log(&self, entry: &SubmissionLogEntry) -> DbResult<()>;

    /// Log entries of a document, oldest first.
    async fn list_logs(&self, document_ref: &str) -> DbResult<Vec<SubmissionLogEntry>>;

    /// Documents in `Error` whose last failure was retryable and which have
    /// fewer than `max_attempts` attempts, least recently attempted first.
    /// Only finalized documents of enabled tenants qualify.
    async fn list_redrivable(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> DbResult<Vec<RedriveCandidate>>;

    async fn health_check(&self) -> bool;
}
