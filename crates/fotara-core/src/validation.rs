//! # Validation Module
//!
//! Intake validation for tenant settings and host documents.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Intake (THIS MODULE)                                         │
//! │  ├── Shape: references, abbreviation, country, rates                   │
//! │  └── Rejects before anything is stored                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Payload builder                                              │
//! │  ├── Reversal reference, buyer identifier, UOM mapping                 │
//! │  └── Depends on other documents and tenant tables at send time         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (PostgreSQL)                                        │
//! │  ├── CHECK constraints, UNIQUE (tenant, counter)                       │
//! │  └── Identity freeze trigger                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Intake deliberately lets a credit note through without `reversal_of`:
//! that failure belongs to the builder so it surfaces as a submission
//! error on the document.

use crate::amount::Amount;
use crate::error::ValidationError;
use crate::types::{FiscalDocument, LineItem, TenantFiscalConfig};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted host reference.
pub const MAX_REFERENCE_LEN: usize = 140;

/// Longest accepted tenant abbreviation.
pub const MAX_ABBREVIATION_LEN: usize = 20;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a host reference (tenant or document).
///
/// ## Rules
/// - Must not be empty
/// - At most 140 characters
/// - No whitespace or `/` (references travel in URL paths)
///
/// ## Example
/// ```rust
/// use fotara_core::validation::validate_reference;
///
/// assert!(validate_reference("document_ref", "SINV-0001").is_ok());
/// assert!(validate_reference("document_ref", "").is_err());
/// assert!(validate_reference("document_ref", "SINV 1").is_err());
/// ```
pub fn validate_reference(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_REFERENCE_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_REFERENCE_LEN,
        });
    }

    if value.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain whitespace or '/'".to_string(),
        });
    }

    Ok(())
}

/// Validates free text that ends up in the UBL document.
///
/// XML 1.0 has no escape for C0 control characters other than tab, line
/// feed and carriage return, so any other control character is rejected.
///
/// ## Example
/// ```rust
/// use fotara_core::validation::validate_xml_text;
///
/// assert!(validate_xml_text("lines[0].name", "Tea\tgreen").is_ok());
/// assert!(validate_xml_text("lines[0].name", "Tea\u{1}").is_err());
/// ```
pub fn validate_xml_text(field: &str, value: &str) -> ValidationResult<()> {
    if value
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }
    Ok(())
}

/// Validates the daily id prefix.
///
/// ## Rules
/// - 1 to 20 characters
/// - ASCII letters, digits and `_` only (the id itself uses `-` as separator)
pub fn validate_abbreviation(abbreviation: &str) -> ValidationResult<()> {
    if abbreviation.is_empty() {
        return Err(ValidationError::Required {
            field: "abbreviation".to_string(),
        });
    }

    if abbreviation.len() > MAX_ABBREVIATION_LEN {
        return Err(ValidationError::TooLong {
            field: "abbreviation".to_string(),
            max: MAX_ABBREVIATION_LEN,
        });
    }

    if !abbreviation
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "abbreviation".to_string(),
            reason: "must contain only ASCII letters, digits, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates an ISO 3166 alpha-2 country code.
pub fn validate_country_code(field: &str, code: &str) -> ValidationResult<()> {
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a two-letter country code".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a percentage tax rate.
///
/// ## Rules
/// - Between 0 and 100 inclusive
pub fn validate_tax_rate(field: &str, rate: Amount) -> ValidationResult<()> {
    if rate.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    if rate > Amount::from_int(100) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not exceed 100 percent".to_string(),
        });
    }

    Ok(())
}

fn validate_line(index: usize, line: &LineItem) -> ValidationResult<()> {
    let field = |name: &str| format!("lines[{}].{}", index, name);

    if line.name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field("name"),
        });
    }

    if line.quantity.is_zero() {
        return Err(ValidationError::MustBePositive {
            field: field("quantity"),
        });
    }

    if line.unit_price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field("unit_price"),
        });
    }

    if line.uom.trim().is_empty() {
        return Err(ValidationError::Required { field: field("uom") });
    }

    validate_tax_rate(&field("tax_rate"), line.tax_rate)
}

// =============================================================================
// Aggregate Validators
// =============================================================================

/// Checks every tenant field rendered into the payload.
pub fn validate_tenant_text(tenant: &TenantFiscalConfig) -> ValidationResult<()> {
    validate_xml_text("seller.name", &tenant.seller.name)?;
    validate_xml_text("seller.tax_id", &tenant.seller.tax_id)?;
    validate_xml_text("seller.postal_code", &tenant.seller.postal_code)?;
    validate_xml_text("branch_id", &tenant.branch_id)?;
    validate_xml_text("default_region_code", &tenant.default_region_code)
}

/// Checks every document field rendered into the payload.
pub fn validate_document_text(document: &FiscalDocument) -> ValidationResult<()> {
    let buyer = &document.buyer;
    validate_xml_text("buyer.name", &buyer.name)?;
    let optional = [
        ("buyer.id_value", &buyer.id_value),
        ("buyer.region_code", &buyer.region_code),
        ("buyer.postal_code", &buyer.postal_code),
        ("buyer.phone", &buyer.phone),
    ];
    for (field, value) in optional {
        if let Some(value) = value {
            validate_xml_text(field, value)?;
        }
    }

    for (i, line) in document.lines.iter().enumerate() {
        validate_xml_text(&format!("lines[{}].name", i), &line.name)?;
        validate_xml_text(&format!("lines[{}].uom", i), &line.uom)?;
    }
    Ok(())
}

/// Validates tenant settings before they are stored.
pub fn validate_tenant(tenant: &TenantFiscalConfig) -> ValidationResult<()> {
    validate_reference("tenant_ref", &tenant.tenant_ref)?;
    validate_abbreviation(&tenant.abbreviation)?;
    validate_country_code("country_code", &tenant.country_code)?;

    if tenant.seller.name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "seller.name".to_string(),
        });
    }

    if tenant.default_region_code.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "default_region_code".to_string(),
        });
    }

    if tenant.currency_code.len() != 3 {
        return Err(ValidationError::InvalidFormat {
            field: "currency_code".to_string(),
            reason: "must be a three-letter currency code".to_string(),
        });
    }

    if tenant.buyer_id_threshold.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "buyer_id_threshold".to_string(),
        });
    }

    validate_tenant_text(tenant)
}

/// Validates a host document before it is stored.
pub fn validate_document(document: &FiscalDocument) -> ValidationResult<()> {
    validate_reference("document_ref", &document.document_ref)?;
    validate_reference("tenant_ref", &document.tenant_ref)?;

    if document.lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    for (i, line) in document.lines.iter().enumerate() {
        validate_line(i, line)?;
    }

    if let Some(code) = document.buyer.country_code.as_deref() {
        if !code.trim().is_empty() {
            validate_country_code("buyer.country_code", code.trim())?;
        }
    }

    if let Some(original) = document.reversal_of.as_deref() {
        if original == document.document_ref {
            return Err(ValidationError::InvalidFormat {
                field: "reversal_of".to_string(),
                reason: "a document cannot reverse itself".to_string(),
            });
        }
    }

    validate_document_text(document)
}

// =============================================================================
// Unit Tests
// =============================================================================
