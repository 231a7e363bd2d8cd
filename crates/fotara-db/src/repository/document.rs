//! # Document Repository
//!
//! Document content, identity allocation and attempt outcomes.
//!
//! ## Allocation Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    allocate_identity(request)                           │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    set_config('lock_timeout', '<wait>ms', true)                        │
//! │    SELECT ... FROM fiscal_tenants   WHERE tenant_ref = $1   FOR UPDATE │
//! │         │   (concurrent callers for the same tenant queue here)        │
//! │         │   (55P03 after <wait> ──► DbError::LockTimeout)              │
//! │         ▼                                                               │
//! │    SELECT ... FROM fiscal_documents WHERE document_ref = $2 FOR UPDATE │
//! │         │                                                               │
//! │         ├── identity present? ──► COMMIT, return it (fresh = false)    │
//! │         ▼                                                               │
//! │    CounterState::advance(abbr, today, uuid)                            │
//! │    UPDATE fiscal_tenants   SET latest_issued_counter, daily seq ...    │
//! │    UPDATE fiscal_documents SET daily_id, fiscal_uuid, audit_counter,   │
//! │                                status = 'queued'                       │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any error before COMMIT rolls back both rows: a counter is never
//! advanced without the document receiving it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fotara_core::{
    Buyer, DocumentStatus, FiscalDocument, Identity, LineItem,
};

use crate::error::{DbError, DbResult};
use crate::repository::tenant::{TenantRow, TENANT_COLUMNS};
use crate::store::{AllocationOutcome, AllocationRequest, AttemptOutcome, RedriveCandidate};

const DOCUMENT_COLUMNS: &str = r#"
    document_ref, tenant_ref, kind, finalized, is_pos, payment_terms,
    buyer, lines, discount, reversal_of,
    daily_id, fiscal_uuid, audit_counter,
    status, qr_artifact, last_error_kind, last_error_retryable, attempts
"#;

/// Row shape of `fiscal_documents`.
#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    document_ref: String,
    tenant_ref: String,
    kind: String,
    finalized: bool,
    is_pos: bool,
    payment_terms: String,
    buyer: Json<Buyer>,
    lines: Json<Vec<LineItem>>,
    discount: Decimal,
    reversal_of: Option<String>,
    daily_id: Option<String>,
    fiscal_uuid: Option<Uuid>,
    audit_counter: Option<i64>,
    status: String,
    qr_artifact: Option<String>,
    last_error_kind: Option<String>,
    last_error_retryable: bool,
    attempts: i32,
}

impl TryFrom<DocumentRow> for FiscalDocument {
    type Error = DbError;

    fn try_from(row: DocumentRow) -> DbResult<Self> {
        let identity = match (row.daily_id, row.fiscal_uuid, row.audit_counter) {
            (Some(daily_id), Some(uuid), Some(audit_counter)) => Some(Identity {
                daily_id,
                uuid,
                audit_counter,
            }),
            (None, None, None) => None,
            _ => return Err(DbError::corrupt("document", "partial identity")),
        };

        Ok(FiscalDocument {
            document_ref: row.document_ref,
            tenant_ref: row.tenant_ref,
            kind: row.kind.parse().map_err(|e| DbError::corrupt("document", e))?,
            finalized: row.finalized,
            is_pos: row.is_pos,
            payment_terms: row
                .payment_terms
                .parse()
                .map_err(|e| DbError::corrupt("document", e))?,
            buyer: row.buyer.0,
            lines: row.lines.0,
            discount: row.discount.into(),
            reversal_of: row.reversal_of,
            identity,
            status: row.status.parse().map_err(|e| DbError::corrupt("document", e))?,
            qr_artifact: row.qr_artifact,
            last_error_kind: row.last_error_kind,
            last_error_retryable: row.last_error_retryable,
            attempts: row.attempts,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    daily_id: Option<String>,
    fiscal_uuid: Option<Uuid>,
    audit_counter: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct RedriveRow {
    document_ref: String,
    tenant_ref: String,
    attempts: i32,
    last_attempt_at: Option<DateTime<Utc>>,
}

/// Repository for document operations.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    /// Creates a new DocumentRepository.
    pub fn new(pool: PgPool) -> Self {
        DocumentRepository { pool }
    }

    /// Gets a document by reference.
    pub async fn get(&self, document_ref: &str) -> DbResult<Option<FiscalDocument>> {
        let sql = format!(
            "SELECT {} FROM fiscal_documents WHERE document_ref = $1",
            DOCUMENT_COLUMNS
        );

        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(document_ref)
            .fetch_optional(&self.pool)
            .await?;

        row.map(FiscalDocument::try_from).transpose()
    }

    /// Creates a document or replaces its content.
    ///
    /// The update only matches while the document has no identity; an
    /// identified document yields `Immutable`.
    pub async fn upsert(&self, document: &FiscalDocument) -> DbResult<FiscalDocument> {
        debug!(document_ref = %document.document_ref, "Upserting document");

        let sql = format!(
            r#"
            INSERT INTO fiscal_documents (
                document_ref, tenant_ref, kind, finalized, is_pos, payment_terms,
                buyer, lines, discount, reversal_of
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (document_ref) DO UPDATE SET
                kind = EXCLUDED.kind,
                finalized = EXCLUDED.finalized,
                is_pos = EXCLUDED.is_pos,
                payment_terms = EXCLUDED.payment_terms,
                buyer = EXCLUDED.buyer,
                lines = EXCLUDED.lines,
                discount = EXCLUDED.discount,
                reversal_of = EXCLUDED.reversal_of,
                updated_at = NOW()
            WHERE fiscal_documents.daily_id IS NULL
              AND fiscal_documents.tenant_ref = EXCLUDED.tenant_ref
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        );

        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(&document.document_ref)
            .bind(&document.tenant_ref)
            .bind(document.kind.as_str())
            .bind(document.finalized)
            .bind(document.is_pos)
            .bind(document.payment_terms.as_str())
            .bind(Json(&document.buyer))
            .bind(Json(&document.lines))
            .bind(document.discount.value())
            .bind(&document.reversal_of)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(DbError::immutable(
                "Document",
                &document.document_ref,
                "already identified or owned by another tenant",
            )),
        }
    }

    /// Issues an identity under the tenant row lock. See module docs.
    pub async fn allocate_identity(
        &self,
        request: &AllocationRequest,
    ) -> DbResult<AllocationOutcome> {
        let lock_wait_ms = request.lock_wait.as_millis().max(1);
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", lock_wait_ms))
            .execute(&mut *tx)
            .await?;

        let tenant_sql = format!(
            "SELECT {} FROM fiscal_tenants WHERE tenant_ref = $1 FOR UPDATE",
            TENANT_COLUMNS
        );
        let tenant = sqlx::query_as::<_, TenantRow>(&tenant_sql)
            .bind(&request.tenant_ref)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| lock_context(e, "tenant", &request.tenant_ref))?
            .ok_or_else(|| DbError::not_found("Tenant", &request.tenant_ref))?;

        let existing = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT daily_id, fiscal_uuid, audit_counter
            FROM fiscal_documents
            WHERE document_ref = $1 AND tenant_ref = $2
            FOR UPDATE
            "#,
        )
        .bind(&request.document_ref)
        .bind(&request.tenant_ref)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| lock_context(e, "document", &request.document_ref))?
        .ok_or_else(|| DbError::not_found("Document", &request.document_ref))?;

        if let (Some(daily_id), Some(uuid), Some(audit_counter)) =
            (existing.daily_id, existing.fiscal_uuid, existing.audit_counter)
        {
            tx.commit().await?;
            debug!(document_ref = %request.document_ref, "Identity already allocated");
            return Ok(AllocationOutcome {
                identity: Identity {
                    daily_id,
                    uuid,
                    audit_counter,
                },
                fresh: false,
            });
        }

        let allocation =
            tenant
                .counters()
                .advance(&tenant.abbreviation, request.today, request.uuid);
        let next = allocation.next;

        sqlx::query(
            r#"
            UPDATE fiscal_tenants SET
                latest_issued_counter = $2,
                last_daily_seq_date = $3,
                last_daily_seq_number = $4,
                updated_at = NOW()
            WHERE tenant_ref = $1
            "#,
        )
        .bind(&request.tenant_ref)
        .bind(next.latest_issued_counter)
        .bind(next.last_daily_seq_date)
        .bind(next.last_daily_seq_number)
        .execute(&mut *tx)
        .await?;

        let identity = allocation.identity;
        sqlx::query(
            r#"
            UPDATE fiscal_documents SET
                daily_id = $2,
                fiscal_uuid = $3,
                audit_counter = $4,
                status = 'queued',
                updated_at = NOW()
            WHERE document_ref = $1
            "#,
        )
        .bind(&request.document_ref)
        .bind(&identity.daily_id)
        .bind(identity.uuid)
        .bind(identity.audit_counter)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            tenant_ref = %request.tenant_ref,
            document_ref = %request.document_ref,
            daily_id = %identity.daily_id,
            audit_counter = identity.audit_counter,
            "Identity allocated"
        );

        Ok(AllocationOutcome {
            identity,
            fresh: true,
        })
    }

    /// Persists an attempt outcome. Documents in `success` are left as-is.
    pub async fn record_outcome(
        &self,
        document_ref: &str,
        outcome: &AttemptOutcome,
    ) -> DbResult<FiscalDocument> {
        let sql = format!(
            r#"
            UPDATE fiscal_documents SET
                status = $2,
                qr_artifact = COALESCE($3, qr_artifact),
                last_error_kind = $4,
                last_error_retryable = $5,
                attempts = attempts + 1,
                last_attempt_at = $6,
                updated_at = NOW()
            WHERE document_ref = $1
              AND status <> 'success'
              AND daily_id IS NOT NULL
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        );

        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(document_ref)
            .bind(outcome.status.as_str())
            .bind(&outcome.qr_artifact)
            .bind(&outcome.error_kind)
            .bind(outcome.retryable)
            .bind(outcome.attempted_at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return row.try_into();
        }

        // Nothing matched: already succeeded, never identified, or missing.
        let current = self
            .get(document_ref)
            .await?
            .ok_or_else(|| DbError::not_found("Document", document_ref))?;

        match current.status {
            DocumentStatus::Success => {
                warn!(document_ref = %document_ref, "Outcome ignored for succeeded document");
                Ok(current)
            }
            _ => Err(DbError::immutable(
                "Document",
                document_ref,
                "no identity allocated",
            )),
        }
    }

    /// Retryable failures below the attempt cap, least recently tried first.
    ///
    /// Documents the orchestrator would refuse (tenant disabled, document
    /// not finalized) are left out.
    pub async fn list_redrivable(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> DbResult<Vec<RedriveCandidate>> {
        let rows = sqlx::query_as::<_, RedriveRow>(
            r#"
            SELECT d.document_ref, d.tenant_ref, d.attempts, d.last_attempt_at
            FROM fiscal_documents d
            JOIN fiscal_tenants t ON t.tenant_ref = d.tenant_ref
            WHERE d.status = 'error'
              AND d.last_error_retryable
              AND d.finalized
              AND t.enabled
              AND d.attempts < $1
            ORDER BY d.last_attempt_at ASC NULLS FIRST
            LIMIT $2
            "#,
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| RedriveCandidate {
                document_ref: r.document_ref,
                tenant_ref: r.tenant_ref,
                attempts: r.attempts,
                last_attempt_at: r.last_attempt_at,
            })
            .collect())
    }
}

fn lock_context(err: sqlx::Error, entity: &str, id: &str) -> DbError {
    match DbError::from(err) {
        DbError::LockTimeout { .. } => DbError::LockTimeout {
            resource: format!("{} {}", entity, id),
        },
        other => other,
    }
}
