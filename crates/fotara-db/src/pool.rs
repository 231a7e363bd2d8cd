//! # Database Pool Management
//!
//! Connection pool creation and configuration for PostgreSQL.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Gateway startup                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::new(url) ← Configure pool settings                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │              PgPool                      │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Submissions for different tenants run in parallel.                    │
//! │  Submissions for one tenant queue on the tenant row lock.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use secrecy::Secret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

use fotara_core::{FiscalDocument, SubmissionLogEntry};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::document::DocumentRepository;
use crate::repository::log::SubmissionLogRepository;
use crate::repository::tenant::TenantRepository;
use crate::store::{
    AllocationOutcome, AllocationRequest, AttemptOutcome, FiscalStore, RedriveCandidate,
    TenantRecord, TenantUpsert,
};

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new(Secret::new("postgres://localhost/fotara".into()))
///     .max_connections(10)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL connection URL (contains the password).
    pub database_url: Secret<String>,

    /// Maximum number of connections in the pool.
    /// Default: 10
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration for the given URL.
    pub fn new(database_url: Secret<String>) -> Self {
        DbConfig {
            database_url,
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone: the pool is reference counted.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Creates the connection pool and, if enabled, runs migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        use secrecy::ExposeSecret;

        info!(
            max_connections = config.max_connections,
            "Initializing database connection"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect(config.database_url.expose_secret())
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!("Database pool created");

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Wraps an existing pool (tests, embedding).
    pub fn from_pool(pool: PgPool) -> Self {
        Database { pool }
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Returns the tenant repository.
    pub fn tenants(&self) -> TenantRepository {
        TenantRepository::new(self.pool.clone())
    }

    /// Returns the document repository.
    pub fn documents(&self) -> DocumentRepository {
        DocumentRepository::new(self.pool.clone())
    }

    /// Returns the submission log repository.
    pub fn logs(&self) -> SubmissionLogRepository {
        SubmissionLogRepository::new(self.pool.clone())
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

// =============================================================================
// FiscalStore
// =============================================================================

#[async_trait]
impl FiscalStore for Database {
    async fn upsert_tenant(&self, upsert: &TenantUpsert) -> DbResult<TenantRecord> {
        self.tenants().upsert(upsert).await
    }

    async fn get_tenant(&self, tenant_ref: &str) -> DbResult<Option<TenantRecord>> {
        self.tenants().get(tenant_ref).await
    }

    async fn upsert_document(&self, document: &FiscalDocument) -> DbResult<FiscalDocument> {
        self.documents().upsert(document).await
    }

    async fn get_document(&self, document_ref: &str) -> DbResult<Option<FiscalDocument>> {
        self.documents().get(document_ref).await
    }

    async fn allocate_identity(&self, request: &AllocationRequest) -> DbResult<AllocationOutcome> {
        self.documents().allocate_identity(request).await
    }

    async fn record_outcome(
        &self,
        document_ref: &str,
        outcome: &AttemptOutcome,
    ) -> DbResult<FiscalDocument> {
        self.documents().record_outcome(document_ref, outcome).await
    }

    async fn append_log(&self, entry: &SubmissionLogEntry) -> DbResult<()> {
        self.logs().append(entry).await
    }

    async fn list_logs(&self, document_ref: &str) -> DbResult<Vec<SubmissionLogEntry>> {
        self.logs().list_for_document(document_ref).await
    }

    async fn list_redrivable(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> DbResult<Vec<RedriveCandidate>> {
        self.documents().list_redrivable(max_attempts, limit).await
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
