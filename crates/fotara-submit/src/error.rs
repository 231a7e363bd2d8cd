//! # Submission Error Types
//!
//! Error taxonomy of the submission pipeline.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Submission Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Allocation    │  │    Builder      │  │      Transport          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  LockTimeout    │  │  Build(Core)    │  │  TransportFailure       │ │
//! │  │  (no state      │  │  (identity      │  │  TransportTimeout       │ │
//! │  │   mutated)      │  │   preserved)    │  │  EndpointRejected       │ │
//! │  │                 │  │                 │  │  MissingCredentials     │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Entry Rules    │  │    Storage      │  │    Configuration        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  TenantDisabled │  │  NotFound       │  │  InvalidConfig          │ │
//! │  │  DocumentNot-   │  │  Storage        │  │  ConfigLoadFailed       │ │
//! │  │   Finalized     │  │  Validation     │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  RETRYABLE: LockTimeout, TransportFailure, TransportTimeout,           │
//! │             transient Storage                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use fotara_core::{CoreError, ValidationError};
use fotara_db::DbError;

/// Result type alias for pipeline operations.
pub type SubmitResult<T> = Result<T, SubmitError>;

/// Submission error type covering every pipeline failure.
///
/// No variant ever implies that an allocated identity was discarded: every
/// failure after allocation leaves the identity on the document for the
/// next attempt.
#[derive(Debug, Error)]
pub enum SubmitError {
    // =========================================================================
    // Allocation Errors
    // =========================================================================
    /// The tenant counter lock was not acquired in time. Nothing was written.
    #[error("Timed out waiting for the counter lock of {resource}")]
    LockTimeout { resource: String },

    // =========================================================================
    // Builder Errors
    // =========================================================================
    /// The payload could not be built from the document.
    #[error(transparent)]
    Build(#[from] CoreError),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Network failure or a server-side (5xx/429) response.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// No response within the configured timeout.
    #[error("Endpoint did not answer within {0} seconds")]
    TransportTimeout(u64),

    /// The endpoint refused the document.
    ///
    /// `duplicate_counter` is set when the endpoint says the audit counter
    /// or identity was already used. Those are never redriven.
    #[error("Endpoint rejected the document: {message}")]
    EndpointRejected {
        message: String,
        duplicate_counter: bool,
    },

    /// The tenant has no endpoint credentials.
    #[error("Tenant {tenant_ref} has no endpoint credentials")]
    MissingCredentials { tenant_ref: String },

    // =========================================================================
    // Entry Rule Errors
    // =========================================================================
    /// Manual submission for a tenant with fiscal submission disabled.
    #[error("Fiscal submission is disabled for tenant {tenant_ref}")]
    TenantDisabled { tenant_ref: String },

    /// The host has not finalized the document yet.
    #[error("Document {document_ref} is not finalized")]
    DocumentNotFinalized { document_ref: String },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Intake data failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Any other storage failure.
    #[error("Storage error: {0}")]
    Storage(DbError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid pipeline configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),
}

impl SubmitError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        SubmitError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true if the same call may succeed later without anyone
    /// touching the data. Drives automatic redrive.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmitError::LockTimeout { .. }
            | SubmitError::TransportFailure(_)
            | SubmitError::TransportTimeout(_) => true,
            SubmitError::Storage(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SubmitError::InvalidConfig(_) | SubmitError::ConfigLoadFailed(_)
        )
    }

    /// Stable machine-readable kind, persisted as the document's
    /// `last_error_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::LockTimeout { .. } => "lock_timeout",
            SubmitError::Build(err) => err.kind(),
            SubmitError::TransportFailure(_) => "transport_failure",
            SubmitError::TransportTimeout(_) => "transport_timeout",
            SubmitError::EndpointRejected {
                duplicate_counter: true,
                ..
            } => "duplicate_counter",
            SubmitError::EndpointRejected { .. } => "endpoint_rejected",
            SubmitError::MissingCredentials { .. } => "missing_credentials",
            SubmitError::TenantDisabled { .. } => "tenant_disabled",
            SubmitError::DocumentNotFinalized { .. } => "document_not_finalized",
            SubmitError::NotFound { .. } => "not_found",
            SubmitError::Validation(_) => "validation",
            SubmitError::Storage(_) => "storage",
            SubmitError::InvalidConfig(_) => "invalid_config",
            SubmitError::ConfigLoadFailed(_) => "config_load_failed",
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<DbError> for SubmitError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::LockTimeout { resource } => SubmitError::LockTimeout { resource },
            DbError::NotFound { entity, id } => SubmitError::NotFound { entity, id },
            other => SubmitError::Storage(other),
        }
    }
}

impl From<std::io::Error> for SubmitError {
    fn from(err: std::io::Error) -> Self {
        SubmitError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SubmitError {
    fn from(err: toml::de::Error) -> Self {
        SubmitError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(SubmitError::LockTimeout {
            resource: "tenant t1".into()
        }
        .is_retryable());
        assert!(SubmitError::TransportFailure("connection reset".into()).is_retryable());
        assert!(SubmitError::TransportTimeout(30).is_retryable());

        assert!(!SubmitError::EndpointRejected {
            message: "invalid tax id".into(),
            duplicate_counter: false,
        }
        .is_retryable());
        assert!(!SubmitError::MissingCredentials {
            tenant_ref: "t1".into()
        }
        .is_retryable());
        assert!(!SubmitError::Build(CoreError::UnmappedUnitOfMeasure {
            document_ref: "SINV-1".into(),
            line: 1,
            uom: "Box".into(),
        })
        .is_retryable());
    }

    #[test]
    fn test_kind_follows_builder_error() {
        let err = SubmitError::from(CoreError::MissingBuyerIdentifier {
            document_ref: "SINV-1".into(),
            reason: "credit note".into(),
        });
        assert_eq!(err.kind(), "missing_buyer_identifier");
    }

    #[test]
    fn test_duplicate_rejection_has_own_kind() {
        let err = SubmitError::EndpointRejected {
            message: "Duplicate ICV".into(),
            duplicate_counter: true,
        };
        assert_eq!(err.kind(), "duplicate_counter");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_db_errors_keep_their_meaning() {
        let err = SubmitError::from(DbError::LockTimeout {
            resource: "tenant t1".into(),
        });
        assert!(matches!(err, SubmitError::LockTimeout { .. }));

        let err = SubmitError::from(DbError::not_found("Document", "SINV-9"));
        assert!(matches!(err, SubmitError::NotFound { .. }));
        assert!(err.to_string().contains("SINV-9"));

        let err = SubmitError::from(DbError::PoolExhausted);
        assert!(matches!(err, SubmitError::Storage(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SubmitError::InvalidConfig("bad".into()).is_config_error());
        assert!(!SubmitError::TransportTimeout(1).is_config_error());
    }
}
