//! # Domain Types
//!
//! Core domain types used throughout the submission pipeline.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────────┐   ┌─────────────────────┐                      │
//! │  │ TenantFiscalConfig  │   │   FiscalDocument    │                      │
//! │  │  ─────────────────  │   │  ─────────────────  │                      │
//! │  │  tenant_ref         │◄──│  tenant_ref         │                      │
//! │  │  abbreviation       │   │  document_ref       │                      │
//! │  │  enabled / auto     │   │  kind, lines, buyer │                      │
//! │  │  seller profile     │   │  identity (once)    │──► Identity          │
//! │  │  uom_mapping        │   │  status             │    daily_id          │
//! │  └─────────────────────┘   └─────────────────────┘    uuid              │
//! │                                      │                audit_counter     │
//! │                                      ▼                                  │
//! │                            ┌─────────────────────┐                      │
//! │                            │ SubmissionLogEntry  │  append-only,        │
//! │                            │  one per attempt    │  one per attempt     │
//! │                            └─────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity Is Write-Once
//! `FiscalDocument::identity` moves from `None` to `Some` exactly once,
//! inside the allocator's lock scope. Nothing else in the workspace
//! writes it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::amount::Amount;
use crate::error::ValidationError;

// =============================================================================
// Document Kind
// =============================================================================

/// Sales invoice or credit note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    CreditNote,
}

impl DocumentKind {
    /// UBL invoice type code: 388 for invoices, 381 for credit notes.
    pub fn type_code(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "388",
            DocumentKind::CreditNote => "381",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::CreditNote => "credit_note",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice" => Ok(DocumentKind::Invoice),
            "credit_note" => Ok(DocumentKind::CreditNote),
            other => Err(ValidationError::InvalidFormat {
                field: "kind".into(),
                reason: format!("unknown document kind '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Document Status
// =============================================================================

/// Persisted submission status of a document.
///
/// ```text
///   Pending ──allocate──► Queued ──send──► Success (terminal)
///                            │   ▲
///                            ▼   │ retry (same identity)
///                           Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// No identity yet.
    #[default]
    Pending,
    /// Identity allocated, not yet accepted.
    Queued,
    /// Accepted by the endpoint.
    Success,
    /// Last attempt failed; identity preserved for retry.
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Queued => "queued",
            DocumentStatus::Success => "success",
            DocumentStatus::Error => "error",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "queued" => Ok(DocumentStatus::Queued),
            "success" => Ok(DocumentStatus::Success),
            "error" => Ok(DocumentStatus::Error),
            other => Err(ValidationError::InvalidFormat {
                field: "status".into(),
                reason: format!("unknown status '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Tax Category
// =============================================================================

/// Tax category of a line. Declaration order is the order subtotal
/// blocks are emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxCategory {
    /// Taxed at a positive rate (`S`).
    Standard,
    /// Domestic zero-rated / exempt (`Z`).
    ZeroExempt,
    /// Outside the scope of the tax, e.g. exports (`O`).
    OutOfScope,
}

impl TaxCategory {
    /// Endpoint category code.
    pub fn code(&self) -> &'static str {
        match self {
            TaxCategory::Standard => "S",
            TaxCategory::ZeroExempt => "Z",
            TaxCategory::OutOfScope => "O",
        }
    }

    /// Derives the category for hosts that only record a rate.
    ///
    /// - rate > 0 → Standard
    /// - rate = 0, domestic buyer → ZeroExempt
    /// - rate = 0, foreign buyer → OutOfScope
    pub fn classify(rate: Amount, domestic_buyer: bool) -> Self {
        if rate.is_positive() {
            TaxCategory::Standard
        } else if domestic_buyer {
            TaxCategory::ZeroExempt
        } else {
            TaxCategory::OutOfScope
        }
    }
}

// =============================================================================
// Payment Terms
// =============================================================================

/// How the sale is settled. Drives the cash/credit digit of the
/// transaction type and the buyer identifier rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTerms {
    #[default]
    Cash,
    Credit,
    /// Cash for point-of-sale documents, credit otherwise.
    Auto,
}

impl PaymentTerms {
    pub fn is_credit(&self, is_pos: bool) -> bool {
        match self {
            PaymentTerms::Cash => false,
            PaymentTerms::Credit => true,
            PaymentTerms::Auto => !is_pos,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentTerms::Cash => "cash",
            PaymentTerms::Credit => "credit",
            PaymentTerms::Auto => "auto",
        }
    }
}

impl FromStr for PaymentTerms {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentTerms::Cash),
            "credit" => Ok(PaymentTerms::Credit),
            "auto" => Ok(PaymentTerms::Auto),
            other => Err(ValidationError::InvalidFormat {
                field: "payment_terms".into(),
                reason: format!("unknown payment terms '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Buyer
// =============================================================================

/// Identification scheme of the buyer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyerIdScheme {
    #[default]
    NationalId,
    TaxNumber,
    Passport,
}

impl BuyerIdScheme {
    pub fn code(&self) -> &'static str {
        match self {
            BuyerIdScheme::NationalId => "NIN",
            BuyerIdScheme::TaxNumber => "TN",
            BuyerIdScheme::Passport => "PN",
        }
    }
}

/// Buyer party as recorded by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    pub name: String,
    #[serde(default)]
    pub id_scheme: BuyerIdScheme,
    /// Tax or national identifier.
    #[serde(default)]
    pub id_value: Option<String>,
    /// Address region code; the tenant default applies when absent.
    #[serde(default)]
    pub region_code: Option<String>,
    /// ISO 3166 alpha-2; the tenant country applies when absent.
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Buyer {
    /// Returns the identifier if present and non-blank.
    pub fn identifier(&self) -> Option<&str> {
        self.id_value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// One document line as recorded by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    /// Negative on credit notes in most hosts; transmitted as absolute.
    pub quantity: Amount,
    pub unit_price: Amount,
    /// Host unit of measure, mapped through the tenant table.
    pub uom: String,
    /// Tax rate in percent (e.g. `16` for 16%).
    #[serde(default)]
    pub tax_rate: Amount,
    /// Derived from the rate and the buyer's country when absent.
    #[serde(default)]
    pub tax_category: Option<TaxCategory>,
    /// Line-level discount amount.
    #[serde(default)]
    pub discount: Amount,
}

// =============================================================================
// Identity
// =============================================================================

/// The government-facing identity of a document. Issued once, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// `<abbr>-<YYYY-MM-DD>-<seq:05>`
    pub daily_id: String,
    /// Random v4 uuid.
    pub uuid: Uuid,
    /// Tenant-wide strictly increasing audit counter (ICV).
    pub audit_counter: i64,
}

// =============================================================================
// Fiscal Document
// =============================================================================

/// An invoice or credit note handed over by the host system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalDocument {
    pub document_ref: String,
    pub tenant_ref: String,
    pub kind: DocumentKind,
    /// Host lifecycle: only finalized documents may be submitted.
    #[serde(default)]
    pub finalized: bool,
    /// Point-of-sale document (resolves `PaymentTerms::Auto`).
    #[serde(default)]
    pub is_pos: bool,
    #[serde(default)]
    pub payment_terms: PaymentTerms,
    pub buyer: Buyer,
    pub lines: Vec<LineItem>,
    /// Document-level discount (allowance).
    #[serde(default)]
    pub discount: Amount,
    /// Original document for credit notes.
    #[serde(default)]
    pub reversal_of: Option<String>,

    // Assigned by the pipeline, ignored at intake.
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub status: DocumentStatus,
    #[serde(default)]
    pub qr_artifact: Option<String>,
    #[serde(default)]
    pub last_error_kind: Option<String>,
    #[serde(default)]
    pub last_error_retryable: bool,
    #[serde(default)]
    pub attempts: i32,
}

impl FiscalDocument {
    pub fn is_credit_note(&self) -> bool {
        self.kind == DocumentKind::CreditNote
    }

    /// Read-only projection for observers.
    pub fn projection(&self) -> DocumentProjection {
        DocumentProjection {
            document_ref: self.document_ref.clone(),
            tenant_ref: self.tenant_ref.clone(),
            daily_id: self.identity.as_ref().map(|i| i.daily_id.clone()),
            uuid: self.identity.as_ref().map(|i| i.uuid.to_string()),
            audit_counter: self.identity.as_ref().map(|i| i.audit_counter),
            status: self.status,
            qr_artifact: self.qr_artifact.clone(),
            last_error_kind: self.last_error_kind.clone(),
            attempts: self.attempts,
        }
    }
}

// =============================================================================
// Tenant Fiscal Config
// =============================================================================

/// Seller details printed on every payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerProfile {
    pub name: String,
    #[serde(default)]
    pub tax_id: String,
    #[serde(default)]
    pub postal_code: String,
}

/// Administrator-managed fiscal settings of a tenant.
///
/// Counters and credentials live beside this in storage; they are not
/// part of what the payload builder sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantFiscalConfig {
    pub tenant_ref: String,
    /// Daily id prefix.
    pub abbreviation: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub auto_send_on_finalize: bool,
    /// Income source sequence on the payload.
    #[serde(default)]
    pub branch_id: String,
    #[serde(default = "default_region_code")]
    pub default_region_code: String,
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default = "default_currency_code")]
    pub currency_code: String,
    pub seller: SellerProfile,
    /// Payable above this requires a buyer identifier.
    #[serde(default = "default_buyer_id_threshold")]
    pub buyer_id_threshold: Amount,
    /// Host UOM → endpoint code overrides.
    #[serde(default)]
    pub uom_mapping: BTreeMap<String, String>,
}

fn default_region_code() -> String {
    "JO-AM".to_string()
}

fn default_country_code() -> String {
    "JO".to_string()
}

fn default_currency_code() -> String {
    "JOD".to_string()
}

fn default_buyer_id_threshold() -> Amount {
    Amount::from_int(10_000)
}

/// Built-in UOM table applied under every tenant's overrides.
pub const DEFAULT_UOM_MAPPING: &[(&str, &str)] = &[
    ("Nos", "PCE"),
    ("Unit", "PCE"),
    ("Kg", "KGM"),
    ("Litre", "LTR"),
    ("Meter", "MTR"),
];

impl TenantFiscalConfig {
    /// Creates a config with defaults for everything optional.
    pub fn new(
        tenant_ref: impl Into<String>,
        abbreviation: impl Into<String>,
        seller_name: impl Into<String>,
    ) -> Self {
        TenantFiscalConfig {
            tenant_ref: tenant_ref.into(),
            abbreviation: abbreviation.into(),
            enabled: false,
            auto_send_on_finalize: false,
            branch_id: String::new(),
            default_region_code: default_region_code(),
            country_code: default_country_code(),
            currency_code: default_currency_code(),
            seller: SellerProfile {
                name: seller_name.into(),
                ..Default::default()
            },
            buyer_id_threshold: default_buyer_id_threshold(),
            uom_mapping: BTreeMap::new(),
        }
    }

    /// Resolves a host UOM: tenant override first, then the built-in table.
    pub fn map_uom(&self, uom: &str) -> Option<&str> {
        self.uom_mapping.get(uom).map(String::as_str).or_else(|| {
            DEFAULT_UOM_MAPPING
                .iter()
                .find(|(host, _)| *host == uom)
                .map(|(_, code)| *code)
        })
    }
}

// =============================================================================
// Submission Mode
// =============================================================================

/// What triggered a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    /// Host finalize hook. Skipped quietly when the tenant opted out.
    #[default]
    Auto,
    /// Explicit user action or redrive.
    Manual,
}

// =============================================================================
// Projection & Log
// =============================================================================

/// Read-only view of a document for UIs and observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentProjection {
    pub document_ref: String,
    pub tenant_ref: String,
    pub daily_id: Option<String>,
    pub uuid: Option<String>,
    pub audit_counter: Option<i64>,
    pub status: DocumentStatus,
    pub qr_artifact: Option<String>,
    pub last_error_kind: Option<String>,
    pub attempts: i32,
}

/// One transmission attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SubmissionLogEntry {
    #[ts(as = "String")]
    pub id: Uuid,
    pub document_ref: String,
    pub tenant_ref: String,
    /// `Success` or `Error`.
    pub status: DocumentStatus,
    /// Pre-encoding UBL XML; empty when the builder failed.
    pub raw_payload: String,
    /// Pretty-printed JSON response, `{}` when nothing came back.
    pub response_body: String,
    pub error_detail: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Counter fields of a tenant. Only the allocator writes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    pub starter_counter: i64,
    pub latest_issued_counter: i64,
    pub last_daily_seq_date: Option<NaiveDate>,
    pub last_daily_seq_number: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes() {
        assert_eq!(DocumentKind::Invoice.type_code(), "388");
        assert_eq!(DocumentKind::CreditNote.type_code(), "381");
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Queued,
            DocumentStatus::Success,
            DocumentStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("sent".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_classify_tax_category() {
        let zero = Amount::ZERO;
        let sixteen = Amount::from_int(16);
        assert_eq!(TaxCategory::classify(sixteen, true), TaxCategory::Standard);
        assert_eq!(TaxCategory::classify(sixteen, false), TaxCategory::Standard);
        assert_eq!(TaxCategory::classify(zero, true), TaxCategory::ZeroExempt);
        assert_eq!(TaxCategory::classify(zero, false), TaxCategory::OutOfScope);
    }

    #[test]
    fn test_payment_terms_credit_resolution() {
        assert!(!PaymentTerms::Cash.is_credit(false));
        assert!(PaymentTerms::Credit.is_credit(true));
        assert!(!PaymentTerms::Auto.is_credit(true));
        assert!(PaymentTerms::Auto.is_credit(false));
    }

    #[test]
    fn test_uom_mapping_override_and_default() {
        let mut tenant = TenantFiscalConfig::new("t1", "ACME", "Acme Trading");
        assert_eq!(tenant.map_uom("Nos"), Some("PCE"));
        assert_eq!(tenant.map_uom("Box"), None);

        tenant.uom_mapping.insert("Box".into(), "BX".into());
        tenant.uom_mapping.insert("Nos".into(), "EA".into());
        assert_eq!(tenant.map_uom("Box"), Some("BX"));
        assert_eq!(tenant.map_uom("Nos"), Some("EA"));
    }

    #[test]
    fn test_buyer_identifier_ignores_blank() {
        let mut buyer = Buyer::default();
        assert_eq!(buyer.identifier(), None);
        buyer.id_value = Some("   ".into());
        assert_eq!(buyer.identifier(), None);
        buyer.id_value = Some(" 9876 ".into());
        assert_eq!(buyer.identifier(), Some("9876"));
    }

    #[test]
    fn test_tenant_defaults_from_json() {
        let json = r#"{
            "tenant_ref": "t1",
            "abbreviation": "ACME",
            "seller": { "name": "Acme Trading" }
        }"#;
        let tenant: TenantFiscalConfig = serde_json::from_str(json).unwrap();
        assert_eq!(tenant.default_region_code, "JO-AM");
        assert_eq!(tenant.country_code, "JO");
        assert_eq!(tenant.buyer_id_threshold, Amount::from_int(10_000));
        assert!(!tenant.enabled);
    }
}
