//! # In-Memory Store
//!
//! A [`FiscalStore`] kept in process memory. Used by the test suites of
//! every crate and by the gateway when no database URL is configured.
//!
//! ## Locking Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tenant_locks: tenant_ref ──► Arc<Mutex<()>>                            │
//! │                                                                         │
//! │  allocate_identity:                                                     │
//! │    timeout(lock_wait, tenant_lock.lock_owned())  ──► LockTimeout        │
//! │      read counters + document        (state lock, released)            │
//! │      yield                                                             │
//! │      write counters + identity       (state lock, released)            │
//! │    drop tenant guard                                                   │
//! │                                                                         │
//! │  The state mutex only keeps the maps consistent; it is the tenant      │
//! │  lock that serializes read-advance-write, same as the row lock in      │
//! │  PostgreSQL.                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use fotara_core::{CounterState, DocumentStatus, FiscalDocument, SubmissionLogEntry};

use crate::error::{DbError, DbResult};
use crate::store::{
    AllocationOutcome, AllocationRequest, AttemptOutcome, FiscalStore, RedriveCandidate,
    TenantRecord, TenantUpsert,
};

#[derive(Debug)]
struct StoredDocument {
    document: FiscalDocument,
    last_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    tenants: HashMap<String, TenantRecord>,
    documents: HashMap<String, StoredDocument>,
    logs: Vec<SubmissionLogEntry>,
}

/// In-process store with per-tenant async locks.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    tenant_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    reject_log_appends: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn tenant_lock(&self, tenant_ref: &str) -> Arc<Mutex<()>> {
        let mut locks = self.tenant_locks.lock().await;
        locks
            .entry(tenant_ref.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Takes the tenant lock and holds it until the guard is dropped.
    ///
    /// Lets tests simulate a long-running allocation.
    pub async fn hold_tenant_lock(&self, tenant_ref: &str) -> OwnedMutexGuard<()> {
        self.tenant_lock(tenant_ref).await.lock_owned().await
    }

    /// Makes every subsequent `append_log` fail until reset.
    pub fn set_reject_log_appends(&self, reject: bool) {
        self.reject_log_appends.store(reject, Ordering::SeqCst);
    }

    /// Total log entries across all documents.
    pub async fn log_count(&self) -> usize {
        self.state.lock().await.logs.len()
    }
}

#[async_trait]
impl FiscalStore for MemoryStore {
    async fn upsert_tenant(&self, upsert: &TenantUpsert) -> DbResult<TenantRecord> {
        let mut state = self.state.lock().await;
        let tenant_ref = upsert.config.tenant_ref.clone();

        let record = match state.tenants.remove(&tenant_ref) {
            Some(existing) => TenantRecord {
                config: upsert.config.clone(),
                counters: CounterState {
                    starter_counter: upsert.starter_counter,
                    ..existing.counters
                },
                credentials: upsert.credentials.clone().or(existing.credentials),
            },
            None => TenantRecord {
                config: upsert.config.clone(),
                counters: CounterState::starting_at(upsert.starter_counter),
                credentials: upsert.credentials.clone(),
            },
        };

        state.tenants.insert(tenant_ref.clone(), record.clone());
        info!(tenant_ref = %tenant_ref, "Tenant saved");
        Ok(record)
    }

    async fn get_tenant(&self, tenant_ref: &str) -> DbResult<Option<TenantRecord>> {
        Ok(self.state.lock().await.tenants.get(tenant_ref).cloned())
    }

    async fn upsert_document(&self, document: &FiscalDocument) -> DbResult<FiscalDocument> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if !state.tenants.contains_key(&document.tenant_ref) {
            return Err(DbError::ForeignKeyViolation {
                message: format!("tenant {} does not exist", document.tenant_ref),
            });
        }

        let stored = match state.documents.get_mut(&document.document_ref) {
            Some(existing) => {
                if existing.document.identity.is_some()
                    || existing.document.tenant_ref != document.tenant_ref
                {
                    return Err(DbError::immutable(
                        "Document",
                        &document.document_ref,
                        "already identified or owned by another tenant",
                    ));
                }
                let current = &mut existing.document;
                current.kind = document.kind;
                current.finalized = document.finalized;
                current.is_pos = document.is_pos;
                current.payment_terms = document.payment_terms;
                current.buyer = document.buyer.clone();
                current.lines = document.lines.clone();
                current.discount = document.discount;
                current.reversal_of = document.reversal_of.clone();
                current.clone()
            }
            None => {
                let fresh = FiscalDocument {
                    identity: None,
                    status: DocumentStatus::Pending,
                    qr_artifact: None,
                    last_error_kind: None,
                    last_error_retryable: false,
                    attempts: 0,
                    ..document.clone()
                };
                state.documents.insert(
                    fresh.document_ref.clone(),
                    StoredDocument {
                        document: fresh.clone(),
                        last_attempt_at: None,
                    },
                );
                fresh
            }
        };

        debug!(document_ref = %stored.document_ref, "Document saved");
        Ok(stored)
    }

    async fn get_document(&self, document_ref: &str) -> DbResult<Option<FiscalDocument>> {
        Ok(self
            .state
            .lock()
            .await
            .documents
            .get(document_ref)
            .map(|d| d.document.clone()))
    }

    async fn allocate_identity(&self, request: &AllocationRequest) -> DbResult<AllocationOutcome> {
        let lock = self.tenant_lock(&request.tenant_ref).await;
        let _guard = tokio::time::timeout(request.lock_wait, lock.lock_owned())
            .await
            .map_err(|_| DbError::LockTimeout {
                resource: format!("tenant {}", request.tenant_ref),
            })?;

        let (tenant, existing) = {
            let state = self.state.lock().await;
            let tenant = state
                .tenants
                .get(&request.tenant_ref)
                .cloned()
                .ok_or_else(|| DbError::not_found("Tenant", &request.tenant_ref))?;
            let document = state
                .documents
                .get(&request.document_ref)
                .filter(|d| d.document.tenant_ref == request.tenant_ref)
                .ok_or_else(|| DbError::not_found("Document", &request.document_ref))?;
            (tenant, document.document.identity.clone())
        };

        if let Some(identity) = existing {
            return Ok(AllocationOutcome {
                identity,
                fresh: false,
            });
        }

        let allocation =
            tenant
                .counters
                .advance(&tenant.config.abbreviation, request.today, request.uuid);

        tokio::task::yield_now().await;

        let mut state = self.state.lock().await;
        if let Some(t) = state.tenants.get_mut(&request.tenant_ref) {
            t.counters = CounterState {
                starter_counter: t.counters.starter_counter,
                ..allocation.next
            };
        }
        if let Some(d) = state.documents.get_mut(&request.document_ref) {
            d.document.identity = Some(allocation.identity.clone());
            d.document.status = DocumentStatus::Queued;
        }

        info!(
            tenant_ref = %request.tenant_ref,
            document_ref = %request.document_ref,
            daily_id = %allocation.identity.daily_id,
            audit_counter = allocation.identity.audit_counter,
            "Identity allocated"
        );

        Ok(AllocationOutcome {
            identity: allocation.identity,
            fresh: true,
        })
    }

    async fn record_outcome(
        &self,
        document_ref: &str,
        outcome: &AttemptOutcome,
    ) -> DbResult<FiscalDocument> {
        let mut state = self.state.lock().await;
        let stored = state
            .documents
            .get_mut(document_ref)
            .ok_or_else(|| DbError::not_found("Document", document_ref))?;

        if stored.document.status == DocumentStatus::Success {
            return Ok(stored.document.clone());
        }
        if stored.document.identity.is_none() {
            return Err(DbError::immutable(
                "Document",
                document_ref,
                "no identity allocated",
            ));
        }

        let doc = &mut stored.document;
        doc.status = outcome.status;
        if outcome.qr_artifact.is_some() {
            doc.qr_artifact = outcome.qr_artifact.clone();
        }
        doc.last_error_kind = outcome.error_kind.clone();
        doc.last_error_retryable = outcome.retryable;
        doc.attempts += 1;
        stored.last_attempt_at = Some(outcome.attempted_at);

        Ok(stored.document.clone())
    }

    async fn append_log(&self, entry: &SubmissionLogEntry) -> DbResult<()> {
        if self.reject_log_appends.load(Ordering::SeqCst) {
            return Err(DbError::QueryFailed("log writes rejected".to_string()));
        }
        let mut state = self.state.lock().await;
        if !state.documents.contains_key(&entry.document_ref) {
            return Err(DbError::ForeignKeyViolation {
                message: format!("document {} does not exist", entry.document_ref),
            });
        }
        state.logs.push(entry.clone());
        Ok(())
    }

    async fn list_logs(&self, document_ref: &str) -> DbResult<Vec<SubmissionLogEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .logs
            .iter()
            .filter(|e| e.document_ref == document_ref)
            .cloned()
            .collect())
    }

    async fn list_redrivable(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> DbResult<Vec<RedriveCandidate>> {
        let state = self.state.lock().await;
        let mut candidates: Vec<RedriveCandidate> = state
            .documents
            .values()
            .filter(|d| {
                let tenant_enabled = state
                    .tenants
                    .get(&d.document.tenant_ref)
                    .is_some_and(|t| t.config.enabled);
                d.document.status == DocumentStatus::Error
                    && d.document.last_error_retryable
                    && d.document.finalized
                    && tenant_enabled
                    && d.document.attempts < max_attempts
            })
            .map(|d| RedriveCandidate {
                document_ref: d.document.document_ref.clone(),
                tenant_ref: d.document.tenant_ref.clone(),
                attempts: d.document.attempts,
                last_attempt_at: d.last_attempt_at,
            })
            .collect();

        candidates.sort_by(|a, b| a.last_attempt_at.cmp(&b.last_attempt_at));
        candidates.truncate(limit.max(0) as usize);
        Ok(candidates)
    }

    async fn health_check(&self) -> bool {
        true
    }
}
