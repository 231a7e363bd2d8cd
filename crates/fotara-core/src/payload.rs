//! # Payload Builder
//!
//! Turns a host document plus tenant settings into the canonical fiscal
//! payload. Pure and deterministic: same inputs, same payload.
//!
//! ## Build Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    build(document, identity, ctx)                       │
//! │                                                                         │
//! │  1. Reversal    credit note? ──► original must carry a uuid            │
//! │                 else MissingReversalReference                          │
//! │                                                                         │
//! │  2. Lines       for each line (9 decimals, half away from zero):       │
//! │                   qty        = |quantity|                              │
//! │                   extension  = qty × unit_price − discount             │
//! │                   tax        = extension × rate / 100                  │
//! │                   rounding   = extension + tax                         │
//! │                   uom        = tenant map ─► UnmappedUnitOfMeasure     │
//! │                   category   = given, else classify(rate, buyer)       │
//! │                                                                         │
//! │  3. Grouping    one TaxSubtotal per category present (S, Z, O)         │
//! │                                                                         │
//! │  4. Totals      exclusive = Σ extension     tax = Σ tax                │
//! │                 inclusive = exclusive + tax                            │
//! │                 payable   = inclusive − document discount              │
//! │                                                                         │
//! │  5. Buyer       credit note / credit sale / |payable| > threshold      │
//! │                 ──► identifier required, else MissingBuyerIdentifier   │
//! │                 region: buyer's code, else tenant default              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The nine-decimal values are what gets transmitted. Host totals rounded
//! for display are never read.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::amount::Amount;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{
    DocumentKind, FiscalDocument, Identity, LineItem, TaxCategory, TenantFiscalConfig,
};
use crate::validation::{validate_document_text, validate_tenant_text};

// =============================================================================
// Payload Types
// =============================================================================

/// Reference to the original invoice on a credit note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingReference {
    pub daily_id: String,
    pub uuid: String,
    /// Recomputed payable of the original.
    pub total: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SellerParty {
    pub name: String,
    pub tax_id: String,
    pub postal_code: String,
    pub region_code: String,
    pub country_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuyerParty {
    pub name: String,
    /// `NIN`, `TN` or `PN`.
    pub id_scheme: String,
    /// Empty when not required and not recorded.
    pub id_value: String,
    pub region_code: String,
    pub country_code: String,
    pub postal_code: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadLine {
    /// 1-based position.
    pub index: usize,
    pub name: String,
    pub quantity: Amount,
    pub uom_code: String,
    pub unit_price: Amount,
    pub discount: Amount,
    pub line_extension: Amount,
    pub tax_category: TaxCategory,
    pub tax_rate: Amount,
    pub tax_amount: Amount,
    pub rounding_amount: Amount,
}

/// Per-category subtotal block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxSubtotal {
    pub category: TaxCategory,
    pub taxable_amount: Amount,
    pub tax_amount: Amount,
    /// Rate of the first line seen in the category.
    pub percent: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MonetaryTotals {
    pub tax_exclusive: Amount,
    pub total_tax: Amount,
    pub tax_inclusive: Amount,
    pub allowance_total: Amount,
    pub payable: Amount,
}

/// The fully resolved document, ready for rendering and encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiscalPayload {
    pub document_ref: String,
    pub kind: DocumentKind,
    pub identity: Identity,
    pub issue_date: NaiveDate,
    /// `388` or `381`.
    pub invoice_type_code: String,
    /// Three digits: domestic/export, cash/credit, sales.
    pub transaction_type: String,
    pub currency_code: String,
    pub billing_reference: Option<BillingReference>,
    pub seller: SellerParty,
    pub buyer: BuyerParty,
    pub income_source_sequence: String,
    pub lines: Vec<PayloadLine>,
    pub tax_subtotals: Vec<TaxSubtotal>,
    pub totals: MonetaryTotals,
}

// =============================================================================
// Build Context
// =============================================================================

/// Everything besides the document the builder needs.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub tenant: &'a TenantFiscalConfig,
    /// The document named by `reversal_of`, if it could be loaded.
    pub original: Option<&'a FiscalDocument>,
    /// Issue date in the tenant calendar.
    pub issue_date: NaiveDate,
}

// =============================================================================
// Line Math
// =============================================================================

struct LineAmounts {
    quantity: Amount,
    discount: Amount,
    extension: Amount,
    tax: Amount,
}

fn line_amounts(line: &LineItem) -> LineAmounts {
    let quantity = line.quantity.abs();
    let discount = line.discount.abs();
    let extension = quantity * line.unit_price - discount;
    let tax = extension.percent(line.tax_rate);
    LineAmounts {
        quantity,
        discount,
        extension,
        tax,
    }
}

/// Recomputes a document's totals from its lines alone.
pub fn document_totals(document: &FiscalDocument) -> MonetaryTotals {
    let mut tax_exclusive = Amount::ZERO;
    let mut total_tax = Amount::ZERO;
    for line in &document.lines {
        let a = line_amounts(line);
        tax_exclusive += a.extension;
        total_tax += a.tax;
    }
    totals_from(tax_exclusive, total_tax, document.discount.abs())
}

fn totals_from(tax_exclusive: Amount, total_tax: Amount, allowance: Amount) -> MonetaryTotals {
    let tax_inclusive = tax_exclusive + total_tax;
    MonetaryTotals {
        tax_exclusive,
        total_tax,
        tax_inclusive,
        allowance_total: allowance,
        payable: tax_inclusive - allowance,
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds the canonical payload for an identified document.
///
/// ## Errors
/// - `MissingReversalReference`: credit note whose original has no uuid
/// - `UnmappedUnitOfMeasure`: a line's UOM is in neither table
/// - `MissingBuyerIdentifier`: identifier required but absent
/// - `Validation`: document has no lines, or text that cannot be carried
///   in XML (control characters)
pub fn build(
    document: &FiscalDocument,
    identity: &Identity,
    ctx: &BuildContext<'_>,
) -> CoreResult<FiscalPayload> {
    let tenant = ctx.tenant;

    let billing_reference = match document.kind {
        DocumentKind::CreditNote => Some(resolve_reversal(document, ctx.original)?),
        DocumentKind::Invoice => None,
    };

    if document.lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".into(),
        }
        .into());
    }
    validate_document_text(document)?;
    validate_tenant_text(tenant)?;

    let buyer_country = resolve_country(document.buyer.country_code.as_deref(), &tenant.country_code);
    let domestic = buyer_country.eq_ignore_ascii_case(&tenant.country_code);

    let mut lines = Vec::with_capacity(document.lines.len());
    let mut groups: BTreeMap<TaxCategory, TaxSubtotal> = BTreeMap::new();
    let mut tax_exclusive = Amount::ZERO;
    let mut total_tax = Amount::ZERO;

    for (i, line) in document.lines.iter().enumerate() {
        let index = i + 1;
        let uom_code = tenant
            .map_uom(&line.uom)
            .ok_or_else(|| CoreError::UnmappedUnitOfMeasure {
                document_ref: document.document_ref.clone(),
                line: index,
                uom: line.uom.clone(),
            })?
            .to_string();

        let a = line_amounts(line);
        tax_exclusive += a.extension;
        total_tax += a.tax;

        let category = line
            .tax_category
            .unwrap_or_else(|| TaxCategory::classify(line.tax_rate, domestic));
        let group = groups.entry(category).or_insert_with(|| TaxSubtotal {
            category,
            taxable_amount: Amount::ZERO,
            tax_amount: Amount::ZERO,
            percent: line.tax_rate,
        });
        group.taxable_amount += a.extension;
        group.tax_amount += a.tax;

        lines.push(PayloadLine {
            index,
            name: line.name.clone(),
            quantity: a.quantity,
            uom_code,
            unit_price: line.unit_price,
            discount: a.discount,
            line_extension: a.extension,
            tax_category: category,
            tax_rate: line.tax_rate,
            tax_amount: a.tax,
            rounding_amount: a.extension + a.tax,
        });
    }

    let totals = totals_from(tax_exclusive, total_tax, document.discount.abs());

    let is_credit = document.payment_terms.is_credit(document.is_pos);
    require_buyer_identifier(document, is_credit, &totals, tenant)?;

    Ok(FiscalPayload {
        document_ref: document.document_ref.clone(),
        kind: document.kind,
        identity: identity.clone(),
        issue_date: ctx.issue_date,
        invoice_type_code: document.kind.type_code().to_string(),
        transaction_type: transaction_type(domestic, is_credit),
        currency_code: tenant.currency_code.clone(),
        billing_reference,
        seller: SellerParty {
            name: tenant.seller.name.clone(),
            tax_id: tenant.seller.tax_id.clone(),
            postal_code: tenant.seller.postal_code.clone(),
            region_code: tenant.default_region_code.clone(),
            country_code: tenant.country_code.to_uppercase(),
        },
        buyer: BuyerParty {
            name: document.buyer.name.clone(),
            id_scheme: document.buyer.id_scheme.code().to_string(),
            id_value: document.buyer.identifier().unwrap_or_default().to_string(),
            region_code: non_blank(document.buyer.region_code.as_deref())
                .unwrap_or(&tenant.default_region_code)
                .to_string(),
            country_code: buyer_country,
            postal_code: document.buyer.postal_code.clone().unwrap_or_default(),
            phone: document.buyer.phone.clone().unwrap_or_default(),
        },
        income_source_sequence: tenant.branch_id.clone(),
        lines,
        tax_subtotals: groups.into_values().collect(),
        totals,
    })
}

/// Runs the credit-note reversal rule on its own, without building.
///
/// Lets a caller refuse a credit note before it claims an identity.
pub fn check_reversal(
    document: &FiscalDocument,
    original: Option<&FiscalDocument>,
) -> CoreResult<()> {
    if document.is_credit_note() {
        resolve_reversal(document, original)?;
    }
    Ok(())
}

fn resolve_reversal(
    document: &FiscalDocument,
    original: Option<&FiscalDocument>,
) -> CoreResult<BillingReference> {
    let original_ref = non_blank(document.reversal_of.as_deref()).unwrap_or_default();
    let missing = || CoreError::MissingReversalReference {
        document_ref: document.document_ref.clone(),
        original: original_ref.to_string(),
    };

    let original = original
        .filter(|o| !original_ref.is_empty() && o.document_ref == original_ref)
        .ok_or_else(missing)?;
    let identity = original.identity.as_ref().ok_or_else(missing)?;

    Ok(BillingReference {
        daily_id: identity.daily_id.clone(),
        uuid: identity.uuid.to_string(),
        total: document_totals(original).payable,
    })
}

fn require_buyer_identifier(
    document: &FiscalDocument,
    is_credit: bool,
    totals: &MonetaryTotals,
    tenant: &TenantFiscalConfig,
) -> CoreResult<()> {
    if document.buyer.identifier().is_some() {
        return Ok(());
    }

    let reason = if document.is_credit_note() {
        Some("credit note".to_string())
    } else if is_credit {
        Some("credit sale".to_string())
    } else if totals.payable.abs() > tenant.buyer_id_threshold {
        Some(format!(
            "payable {} exceeds threshold {}",
            totals.payable, tenant.buyer_id_threshold
        ))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CoreError::MissingBuyerIdentifier {
            document_ref: document.document_ref.clone(),
            reason,
        }),
        None => Ok(()),
    }
}

fn transaction_type(domestic: bool, is_credit: bool) -> String {
    let origin = if domestic { '0' } else { '1' };
    let settlement = if is_credit { '2' } else { '1' };
    format!("{}{}2", origin, settlement)
}

fn resolve_country(buyer_country: Option<&str>, tenant_country: &str) -> String {
    non_blank(buyer_country)
        .unwrap_or(tenant_country)
        .chars()
        .take(2)
        .collect::<String>()
        .to_uppercase()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Buyer, DocumentStatus, PaymentTerms};
    use uuid::Uuid;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn tenant() -> TenantFiscalConfig {
        let mut t = TenantFiscalConfig::new("t1", "ACME", "Acme Trading");
        t.seller.tax_id = "1234567".into();
        t.branch_id = "BR-01".into();
        t
    }

    fn line(qty: &str, price: &str, rate: &str, category: TaxCategory) -> LineItem {
        LineItem {
            name: "Widget".into(),
            quantity: amt(qty),
            unit_price: amt(price),
            uom: "Nos".into(),
            tax_rate: amt(rate),
            tax_category: Some(category),
            discount: Amount::ZERO,
        }
    }

    fn invoice(lines: Vec<LineItem>) -> FiscalDocument {
        FiscalDocument {
            document_ref: "SINV-0001".into(),
            tenant_ref: "t1".into(),
            kind: DocumentKind::Invoice,
            finalized: true,
            is_pos: true,
            payment_terms: PaymentTerms::Cash,
            buyer: Buyer {
                name: "Walk-in".into(),
                ..Default::default()
            },
            lines,
            discount: Amount::ZERO,
            reversal_of: None,
            identity: None,
            status: DocumentStatus::Pending,
            qr_artifact: None,
            last_error_kind: None,
            last_error_retryable: false,
            attempts: 0,
        }
    }

    fn identity(counter: i64) -> Identity {
        Identity {
            daily_id: format!("ACME-2024-03-01-{:05}", counter),
            uuid: Uuid::new_v4(),
            audit_counter: counter,
        }
    }

    fn ctx<'a>(t: &'a TenantFiscalConfig, original: Option<&'a FiscalDocument>) -> BuildContext<'a> {
        BuildContext {
            tenant: t,
            original,
            issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }
    }

    #[test]
    fn test_nine_decimal_line_total() {
        let t = tenant();
        let doc = invoice(vec![line("3", "0.335", "0", TaxCategory::ZeroExempt)]);
        let payload = build(&doc, &identity(1), &ctx(&t, None)).unwrap();

        assert_eq!(payload.lines[0].line_extension.to_string(), "1.005000000");
        assert_eq!(payload.totals.tax_exclusive.to_string(), "1.005000000");
        assert_eq!(payload.totals.payable.to_string(), "1.005000000");
    }

    #[test]
    fn test_line_math_with_discount_and_tax() {
        let t = tenant();
        let mut l = line("2", "10.125", "16", TaxCategory::Standard);
        l.discount = amt("0.25");
        let mut doc = invoice(vec![l]);
        doc.discount = amt("1");

        let payload = build(&doc, &identity(1), &ctx(&t, None)).unwrap();
        let pl = &payload.lines[0];
        assert_eq!(pl.line_extension, amt("20"));
        assert_eq!(pl.tax_amount, amt("3.2"));
        assert_eq!(pl.rounding_amount, amt("23.2"));
        assert_eq!(pl.uom_code, "PCE");

        assert_eq!(payload.totals.tax_inclusive, amt("23.2"));
        assert_eq!(payload.totals.allowance_total, amt("1"));
        assert_eq!(payload.totals.payable, amt("22.2"));
    }

    #[test]
    fn test_three_categories_three_blocks() {
        let t = tenant();
        let doc = invoice(vec![
            line("1", "100", "16", TaxCategory::Standard),
            line("1", "50", "0", TaxCategory::ZeroExempt),
            line("2", "5", "0", TaxCategory::OutOfScope),
            line("1", "10", "16", TaxCategory::Standard),
        ]);
        let payload = build(&doc, &identity(1), &ctx(&t, None)).unwrap();

        let codes: Vec<_> = payload.tax_subtotals.iter().map(|s| s.category.code()).collect();
        assert_eq!(codes, vec!["S", "Z", "O"]);
        assert_eq!(payload.tax_subtotals[0].taxable_amount, amt("110"));
        assert_eq!(payload.tax_subtotals[0].tax_amount, amt("17.6"));
        assert_eq!(payload.tax_subtotals[2].taxable_amount, amt("10"));
    }

    #[test]
    fn test_missing_category_derived_from_rate_and_buyer() {
        let t = tenant();
        let mut taxed = line("1", "100", "16", TaxCategory::Standard);
        taxed.tax_category = None;
        let mut untaxed = line("1", "50", "0", TaxCategory::Standard);
        untaxed.tax_category = None;
        let mut doc = invoice(vec![taxed, untaxed]);

        let payload = build(&doc, &identity(1), &ctx(&t, None)).unwrap();
        let codes: Vec<_> = payload.tax_subtotals.iter().map(|s| s.category.code()).collect();
        assert_eq!(codes, vec!["S", "Z"]);
        assert_eq!(payload.lines[1].tax_category, TaxCategory::ZeroExempt);

        doc.buyer.country_code = Some("SA".into());
        let payload = build(&doc, &identity(1), &ctx(&t, None)).unwrap();
        assert_eq!(payload.lines[1].tax_category, TaxCategory::OutOfScope);
    }

    #[test]
    fn test_single_category_single_block() {
        let t = tenant();
        let doc = invoice(vec![
            line("1", "100", "16", TaxCategory::Standard),
            line("3", "2", "16", TaxCategory::Standard),
        ]);
        let payload = build(&doc, &identity(1), &ctx(&t, None)).unwrap();
        assert_eq!(payload.tax_subtotals.len(), 1);
    }

    #[test]
    fn test_region_falls_back_to_tenant_default() {
        let t = tenant();
        let mut doc = invoice(vec![line("1", "1", "0", TaxCategory::ZeroExempt)]);
        let payload = build(&doc, &identity(1), &ctx(&t, None)).unwrap();
        assert_eq!(payload.buyer.region_code, "JO-AM");

        doc.buyer.region_code = Some("JO-IR".into());
        let payload = build(&doc, &identity(1), &ctx(&t, None)).unwrap();
        assert_eq!(payload.buyer.region_code, "JO-IR");
    }

    #[test]
    fn test_unmapped_uom_fails() {
        let t = tenant();
        let mut l = line("1", "1", "0", TaxCategory::ZeroExempt);
        l.uom = "Crate".into();
        let doc = invoice(vec![line("1", "1", "0", TaxCategory::ZeroExempt), l]);

        let err = build(&doc, &identity(1), &ctx(&t, None)).unwrap_err();
        assert_eq!(
            err,
            CoreError::UnmappedUnitOfMeasure {
                document_ref: "SINV-0001".into(),
                line: 2,
                uom: "Crate".into(),
            }
        );
    }

    #[test]
    fn test_credit_note_without_original_uuid_fails() {
        let t = tenant();
        let original = invoice(vec![line("1", "10", "16", TaxCategory::Standard)]);
        let mut note = invoice(vec![line("-1", "10", "16", TaxCategory::Standard)]);
        note.document_ref = "CN-0001".into();
        note.kind = DocumentKind::CreditNote;
        note.reversal_of = Some("SINV-0001".into());
        note.buyer.id_value = Some("9876543210".into());

        let err = build(&note, &identity(2), &ctx(&t, Some(&original))).unwrap_err();
        assert!(matches!(err, CoreError::MissingReversalReference { .. }));

        let err = build(&note, &identity(2), &ctx(&t, None)).unwrap_err();
        assert!(matches!(err, CoreError::MissingReversalReference { .. }));
    }

    #[test]
    fn test_credit_note_references_original() {
        let t = tenant();
        let mut original = invoice(vec![line("1", "10", "16", TaxCategory::Standard)]);
        let original_identity = identity(1);
        original.identity = Some(original_identity.clone());

        let mut note = invoice(vec![line("-1", "10", "16", TaxCategory::Standard)]);
        note.document_ref = "CN-0001".into();
        note.kind = DocumentKind::CreditNote;
        note.reversal_of = Some("SINV-0001".into());
        note.buyer.id_value = Some("9876543210".into());

        let payload = build(&note, &identity(2), &ctx(&t, Some(&original))).unwrap();
        let reference = payload.billing_reference.unwrap();
        assert_eq!(reference.uuid, original_identity.uuid.to_string());
        assert_eq!(reference.daily_id, original_identity.daily_id);
        assert_eq!(reference.total, amt("11.6"));
        assert_eq!(payload.invoice_type_code, "381");
        assert_eq!(payload.lines[0].quantity, amt("1"));
    }

    #[test]
    fn test_buyer_identifier_rules() {
        let t = tenant();

        // Credit sale
        let mut doc = invoice(vec![line("1", "10", "0", TaxCategory::ZeroExempt)]);
        doc.payment_terms = PaymentTerms::Credit;
        let err = build(&doc, &identity(1), &ctx(&t, None)).unwrap_err();
        assert!(matches!(err, CoreError::MissingBuyerIdentifier { .. }));

        // Above threshold
        let doc = invoice(vec![line("1", "10000.000000001", "0", TaxCategory::ZeroExempt)]);
        let err = build(&doc, &identity(1), &ctx(&t, None)).unwrap_err();
        assert!(matches!(err, CoreError::MissingBuyerIdentifier { .. }));

        // Exactly at threshold is fine
        let doc = invoice(vec![line("1", "10000", "0", TaxCategory::ZeroExempt)]);
        assert!(build(&doc, &identity(1), &ctx(&t, None)).is_ok());

        // Identifier present
        let mut doc = invoice(vec![line("1", "20000", "0", TaxCategory::ZeroExempt)]);
        doc.buyer.id_value = Some("9876543210".into());
        let payload = build(&doc, &identity(1), &ctx(&t, None)).unwrap();
        assert_eq!(payload.buyer.id_value, "9876543210");
        assert_eq!(payload.buyer.id_scheme, "NIN");
    }

    #[test]
    fn test_transaction_type_digits() {
        let t = tenant();
        let mut doc = invoice(vec![line("1", "1", "0", TaxCategory::OutOfScope)]);
        doc.buyer.id_value = Some("X1".into());

        let payload = build(&doc, &identity(1), &ctx(&t, None)).unwrap();
        assert_eq!(payload.transaction_type, "012");

        doc.payment_terms = PaymentTerms::Auto;
        doc.is_pos = false;
        doc.buyer.country_code = Some("sa".into());
        let payload = build(&doc, &identity(1), &ctx(&t, None)).unwrap();
        assert_eq!(payload.transaction_type, "122");
        assert_eq!(payload.buyer.country_code, "SA");
    }

    #[test]
    fn test_empty_document_rejected() {
        let t = tenant();
        let doc = invoice(vec![]);
        let err = build(&doc, &identity(1), &ctx(&t, None)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_control_character_in_line_name_rejected() {
        let t = tenant();
        let mut l = line("1", "1", "0", TaxCategory::ZeroExempt);
        l.name = "Tea\u{1}".into();
        let doc = invoice(vec![l]);

        let err = build(&doc, &identity(1), &ctx(&t, None)).unwrap_err();
        assert_eq!(
            err,
            CoreError::Validation(ValidationError::InvalidFormat {
                field: "lines[0].name".into(),
                reason: "must not contain control characters".into(),
            })
        );
    }
}
