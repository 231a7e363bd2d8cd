//! # Error Types
//!
//! Domain-specific error types for fotara-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  fotara-core errors (this file)                                        │
//! │  ├── CoreError        - Payload builder failures                       │
//! │  └── ValidationError  - Intake validation failures                     │
//! │                                                                         │
//! │  fotara-db errors (separate crate)                                     │
//! │  └── DbError          - Storage and lock failures                      │
//! │                                                                         │
//! │  fotara-submit errors (separate crate)                                 │
//! │  └── SubmitError      - Pipeline taxonomy (retryable or not)           │
//! │                                                                         │
//! │  Gateway errors (in app)                                               │
//! │  └── ApiError         - What HTTP callers see (serialized)             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SubmitError → ApiError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Builder failures never touch identity. They are fixed upstream (the
//! host document or the tenant's UOM table) and the document is retried.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Payload builder failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A credit note cannot reference its original invoice.
    ///
    /// ## When This Occurs
    /// - `reversal_of` is empty
    /// - The original document does not exist
    /// - The original was never identified (no uuid)
    #[error("Credit note {document_ref} cannot reference original {original}: original has no fiscal uuid")]
    MissingReversalReference {
        document_ref: String,
        original: String,
    },

    /// A buyer tax/national identifier is required but absent.
    ///
    /// ## When This Occurs
    /// - Document is a credit note
    /// - Document is sold on credit
    /// - Payable total exceeds the tenant threshold
    #[error("Buyer identifier is required for {document_ref} ({reason})")]
    MissingBuyerIdentifier {
        document_ref: String,
        reason: String,
    },

    /// A line's unit of measure has no endpoint code.
    #[error("Line {line} of {document_ref}: unit of measure '{uom}' is not mapped")]
    UnmappedUnitOfMeasure {
        document_ref: String,
        line: usize,
        uom: String,
    },

    /// The UBL serializer refused the document.
    #[error("Failed to render UBL document: {0}")]
    Render(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Stable machine-readable kind, persisted on the document.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::MissingReversalReference { .. } => "missing_reversal_reference",
            CoreError::MissingBuyerIdentifier { .. } => "missing_buyer_identifier",
            CoreError::UnmappedUnitOfMeasure { .. } => "unmapped_unit_of_measure",
            CoreError::Render(_) => "render",
            CoreError::Validation(_) => "validation",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised at intake (tenant onboarding, document upsert) before anything
/// is stored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., bad abbreviation, bad country code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
