//! # Submission Log Repository
//!
//! Append-only record of every transmission attempt. There is no update
//! or delete here; the table trigger rejects both anyway.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use fotara_core::SubmissionLogEntry;

use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    id: Uuid,
    document_ref: String,
    tenant_ref: String,
    status: String,
    raw_payload: String,
    response_body: String,
    error_detail: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for SubmissionLogEntry {
    type Error = DbError;

    fn try_from(row: LogRow) -> DbResult<Self> {
        Ok(SubmissionLogEntry {
            id: row.id,
            document_ref: row.document_ref,
            tenant_ref: row.tenant_ref,
            status: row
                .status
                .parse()
                .map_err(|e| DbError::corrupt("submission log", e))?,
            raw_payload: row.raw_payload,
            response_body: row.response_body,
            error_detail: row.error_detail,
            created_at: row.created_at,
        })
    }
}

/// Repository for submission log operations.
#[derive(Debug, Clone)]
pub struct SubmissionLogRepository {
    pool: PgPool,
}

impl SubmissionLogRepository {
    /// Creates a new SubmissionLogRepository.
    pub fn new(pool: PgPool) -> Self {
        SubmissionLogRepository { pool }
    }

    /// Inserts one entry.
    pub async fn append(&self, entry: &SubmissionLogEntry) -> DbResult<()> {
        debug!(
            document_ref = %entry.document_ref,
            status = %entry.status,
            "Appending submission log"
        );

        sqlx::query(
            r#"
            INSERT INTO fiscal_submission_logs (
                id, document_ref, tenant_ref, status,
                raw_payload, response_body, error_detail, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.document_ref)
        .bind(&entry.tenant_ref)
        .bind(entry.status.as_str())
        .bind(&entry.raw_payload)
        .bind(&entry.response_body)
        .bind(&entry.error_detail)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Entries of a document, oldest first.
    pub async fn list_for_document(&self, document_ref: &str) -> DbResult<Vec<SubmissionLogEntry>> {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT id, document_ref, tenant_ref, status,
                   raw_payload, response_body, error_detail, created_at
            FROM fiscal_submission_logs
            WHERE document_ref = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(document_ref)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SubmissionLogEntry::try_from).collect()
    }
}
