//! # Database Error Types
//!
//! Error types for storage operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  PostgreSQL error (sqlx::Error, SQLSTATE)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Categorized by SQLSTATE                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SubmitError ← LockTimeout stays distinct, the rest become Storage     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ApiError (gateway) ← Serialized for callers                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## SQLSTATE Mapping
//! ```text
//! 23505 unique_violation        → UniqueViolation
//! 23503 foreign_key_violation   → ForeignKeyViolation
//! 55P03 lock_not_available      → LockTimeout
//! P0001 raise_exception         → Immutable  (identity / log triggers)
//! ```

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Two documents of a tenant carrying the same audit counter
    /// - Two documents of a tenant carrying the same daily id
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Upserting a document for a tenant that was never onboarded
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// The tenant lock could not be acquired in time.
    ///
    /// Nothing was written. The caller may retry later.
    #[error("Timed out waiting for lock on {resource}")]
    LockTimeout { resource: String },

    /// A write-once field or an append-only row was about to change.
    ///
    /// ## When This Occurs
    /// - Replacing the content of a document that already has an identity
    /// - Updating or deleting a submission log entry
    #[error("{entity} {id} is immutable: {reason}")]
    Immutable {
        entity: String,
        id: String,
        reason: String,
    },

    /// A stored value could not be decoded into a domain type.
    #[error("Corrupt {entity} row: {reason}")]
    Corrupt { entity: String, reason: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates an Immutable error.
    pub fn immutable(
        entity: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        DbError::Immutable {
            entity: entity.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a Corrupt error.
    pub fn corrupt(entity: impl Into<String>, reason: impl ToString) -> Self {
        DbError::Corrupt {
            entity: entity.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failure is transient (connection, pool, lock).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::LockTimeout { .. } | DbError::ConnectionFailed(_) | DbError::PoolExhausted
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → by SQLSTATE (see module docs)
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                let msg = db_err.message().to_string();

                match code.as_str() {
                    "23505" => DbError::UniqueViolation {
                        field: constraint,
                        value: "unknown".to_string(),
                    },
                    "23503" => DbError::ForeignKeyViolation { message: msg },
                    "55P03" => DbError::LockTimeout {
                        resource: "row lock".to_string(),
                    },
                    "P0001" => DbError::Immutable {
                        entity: "row".to_string(),
                        id: "unknown".to_string(),
                        reason: msg,
                    },
                    _ => DbError::QueryFailed(msg),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::Io(e) => DbError::ConnectionFailed(e.to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
