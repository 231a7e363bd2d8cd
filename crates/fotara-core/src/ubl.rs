//! # UBL Rendering
//!
//! Renders a [`FiscalPayload`] as a UBL 2.1 `Invoice` document. The output
//! is the pre-encoding XML: it is stored verbatim in the submission log and
//! base64-encoded for transport.
//!
//! The document is modelled as `Serialize` structs whose field names are
//! the prefixed UBL element names (`cbc:` basic, `cac:` aggregate).
//! `@name` fields become attributes and `$text` the element text, as
//! understood by `quick_xml::se`.
//!
//! ## Document Outline
//! ```text
//! Invoice
//! ├── ProfileID, ID (daily id), UUID, IssueDate
//! ├── InvoiceTypeCode name="<transaction type>"  388 | 381
//! ├── DocumentCurrencyCode, TaxCurrencyCode
//! ├── BillingReference            (credit notes only)
//! ├── AdditionalDocumentReference ID=ICV, UUID=<audit counter>
//! ├── AccountingSupplierParty
//! ├── AccountingCustomerParty
//! ├── SellerSupplierParty         income source sequence
//! ├── AllowanceCharge             document discount
//! ├── TaxTotal                    one TaxSubtotal per category present
//! ├── LegalMonetaryTotal
//! └── InvoiceLine*
//! ```

use quick_xml::se::Serializer;
use serde::Serialize;

use crate::amount::Amount;
use crate::error::{CoreError, CoreResult};
use crate::payload::{FiscalPayload, PayloadLine, TaxSubtotal};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const INVOICE_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
const CAC_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
const CBC_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
const EXT_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
const PROFILE_ID: &str = "reporting:1.0";
const TAX_SCHEME: &str = "VAT";
const UNECE_AGENCY: &str = "6";

// =============================================================================
// Document Model
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename = "Invoice")]
struct Invoice {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "@xmlns:cac")]
    xmlns_cac: &'static str,
    #[serde(rename = "@xmlns:cbc")]
    xmlns_cbc: &'static str,
    #[serde(rename = "@xmlns:ext")]
    xmlns_ext: &'static str,

    #[serde(rename = "cbc:ProfileID")]
    profile_id: &'static str,
    #[serde(rename = "cbc:ID")]
    id: String,
    #[serde(rename = "cbc:UUID")]
    uuid: String,
    #[serde(rename = "cbc:IssueDate")]
    issue_date: String,
    #[serde(rename = "cbc:InvoiceTypeCode")]
    invoice_type_code: InvoiceTypeCode,
    #[serde(rename = "cbc:DocumentCurrencyCode")]
    document_currency_code: String,
    #[serde(rename = "cbc:TaxCurrencyCode")]
    tax_currency_code: String,
    #[serde(
        rename = "cac:BillingReference",
        skip_serializing_if = "Option::is_none"
    )]
    billing_reference: Option<BillingReference>,
    #[serde(rename = "cac:AdditionalDocumentReference")]
    additional_document_reference: DocumentReference,
    #[serde(rename = "cac:AccountingSupplierParty")]
    accounting_supplier_party: SupplierParty,
    #[serde(rename = "cac:AccountingCustomerParty")]
    accounting_customer_party: CustomerParty,
    #[serde(rename = "cac:SellerSupplierParty")]
    seller_supplier_party: SellerSupplierParty,
    #[serde(rename = "cac:AllowanceCharge")]
    allowance_charge: AllowanceCharge,
    #[serde(rename = "cac:TaxTotal")]
    tax_total: TaxTotal,
    #[serde(rename = "cac:LegalMonetaryTotal")]
    legal_monetary_total: LegalMonetaryTotal,
    #[serde(rename = "cac:InvoiceLine")]
    invoice_lines: Vec<InvoiceLine>,
}

#[derive(Debug, Serialize)]
struct InvoiceTypeCode {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "$text")]
    value: String,
}

/// A `cbc:ID`-style code with optional scheme attributes.
#[derive(Debug, Serialize)]
struct Code {
    #[serde(rename = "@schemeID", skip_serializing_if = "Option::is_none")]
    scheme_id: Option<String>,
    #[serde(rename = "@schemeAgencyID", skip_serializing_if = "Option::is_none")]
    scheme_agency_id: Option<&'static str>,
    #[serde(rename = "$text")]
    value: String,
}

impl Code {
    fn plain(value: impl Into<String>) -> Self {
        Code {
            scheme_id: None,
            scheme_agency_id: None,
            value: value.into(),
        }
    }

    fn unece(scheme: &str, value: impl Into<String>) -> Self {
        Code {
            scheme_id: Some(scheme.to_string()),
            scheme_agency_id: Some(UNECE_AGENCY),
            value: value.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MonetaryAmount {
    #[serde(rename = "@currencyID")]
    currency_id: String,
    #[serde(rename = "$text")]
    value: String,
}

impl MonetaryAmount {
    fn new(currency: &str, value: Amount) -> Self {
        MonetaryAmount {
            currency_id: currency.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Quantity {
    #[serde(rename = "@unitCode")]
    unit_code: String,
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Serialize)]
struct BillingReference {
    #[serde(rename = "cac:InvoiceDocumentReference")]
    invoice_document_reference: InvoiceDocumentReference,
}

#[derive(Debug, Serialize)]
struct InvoiceDocumentReference {
    #[serde(rename = "cbc:ID")]
    id: String,
    #[serde(rename = "cbc:UUID")]
    uuid: String,
    #[serde(rename = "cbc:DocumentDescription")]
    document_description: String,
}

#[derive(Debug, Serialize)]
struct DocumentReference {
    #[serde(rename = "cbc:ID")]
    id: &'static str,
    #[serde(rename = "cbc:UUID")]
    uuid: String,
}

#[derive(Debug, Serialize)]
struct Country {
    #[serde(rename = "cbc:IdentificationCode")]
    identification_code: String,
}

#[derive(Debug, Serialize)]
struct PostalAddress {
    #[serde(rename = "cbc:PostalZone")]
    postal_zone: String,
    #[serde(rename = "cbc:CountrySubentityCode")]
    country_subentity_code: String,
    #[serde(rename = "cac:Country")]
    country: Country,
}

#[derive(Debug, Serialize)]
struct TaxScheme {
    #[serde(rename = "cbc:ID")]
    id: Code,
}

impl TaxScheme {
    fn vat() -> Self {
        TaxScheme {
            id: Code::plain(TAX_SCHEME),
        }
    }
}

#[derive(Debug, Serialize)]
struct PartyTaxScheme {
    #[serde(rename = "cbc:CompanyID", skip_serializing_if = "Option::is_none")]
    company_id: Option<String>,
    #[serde(rename = "cac:TaxScheme")]
    tax_scheme: TaxScheme,
}

#[derive(Debug, Serialize)]
struct PartyLegalEntity {
    #[serde(rename = "cbc:RegistrationName")]
    registration_name: String,
}

#[derive(Debug, Serialize)]
struct PartyIdentification {
    #[serde(rename = "cbc:ID")]
    id: Code,
}

#[derive(Debug, Serialize)]
struct SupplierParty {
    #[serde(rename = "cac:Party")]
    party: SellerPartyXml,
}

#[derive(Debug, Serialize)]
struct SellerPartyXml {
    #[serde(rename = "cac:PostalAddress")]
    postal_address: PostalAddress,
    #[serde(rename = "cac:PartyTaxScheme")]
    party_tax_scheme: PartyTaxScheme,
    #[serde(rename = "cac:PartyLegalEntity")]
    party_legal_entity: PartyLegalEntity,
}

#[derive(Debug, Serialize)]
struct CustomerParty {
    #[serde(rename = "cac:Party")]
    party: BuyerPartyXml,
    #[serde(rename = "cac:AccountingContact")]
    accounting_contact: AccountingContact,
}

#[derive(Debug, Serialize)]
struct BuyerPartyXml {
    #[serde(rename = "cac:PartyIdentification")]
    party_identification: PartyIdentification,
    #[serde(rename = "cac:PostalAddress")]
    postal_address: PostalAddress,
    #[serde(rename = "cac:PartyTaxScheme")]
    party_tax_scheme: PartyTaxScheme,
    #[serde(rename = "cac:PartyLegalEntity")]
    party_legal_entity: PartyLegalEntity,
}

#[derive(Debug, Serialize)]
struct AccountingContact {
    #[serde(rename = "cbc:Telephone")]
    telephone: String,
}

#[derive(Debug, Serialize)]
struct SellerSupplierParty {
    #[serde(rename = "cac:Party")]
    party: IncomeSourceParty,
}

#[derive(Debug, Serialize)]
struct IncomeSourceParty {
    #[serde(rename = "cac:PartyIdentification")]
    party_identification: PartyIdentification,
}

#[derive(Debug, Serialize)]
struct AllowanceCharge {
    #[serde(rename = "cbc:ChargeIndicator")]
    charge_indicator: bool,
    #[serde(rename = "cbc:AllowanceChargeReason")]
    reason: &'static str,
    #[serde(rename = "cbc:Amount")]
    amount: MonetaryAmount,
}

impl AllowanceCharge {
    fn discount(reason: &'static str, currency: &str, value: Amount) -> Self {
        AllowanceCharge {
            charge_indicator: false,
            reason,
            amount: MonetaryAmount::new(currency, value),
        }
    }
}

#[derive(Debug, Serialize)]
struct TaxTotal {
    #[serde(rename = "cbc:TaxAmount")]
    tax_amount: MonetaryAmount,
    #[serde(rename = "cac:TaxSubtotal")]
    tax_subtotals: Vec<TaxSubtotalXml>,
}

#[derive(Debug, Serialize)]
struct LineTaxTotal {
    #[serde(rename = "cbc:TaxAmount")]
    tax_amount: MonetaryAmount,
    #[serde(rename = "cbc:RoundingAmount")]
    rounding_amount: MonetaryAmount,
    #[serde(rename = "cac:TaxSubtotal")]
    tax_subtotal: TaxSubtotalXml,
}

#[derive(Debug, Serialize)]
struct TaxSubtotalXml {
    #[serde(rename = "cbc:TaxableAmount")]
    taxable_amount: MonetaryAmount,
    #[serde(rename = "cbc:TaxAmount")]
    tax_amount: MonetaryAmount,
    #[serde(rename = "cac:TaxCategory")]
    tax_category: TaxCategoryXml,
}

#[derive(Debug, Serialize)]
struct TaxCategoryXml {
    #[serde(rename = "cbc:ID")]
    id: Code,
    #[serde(rename = "cbc:Percent")]
    percent: String,
    #[serde(rename = "cac:TaxScheme")]
    tax_scheme: TaxScheme,
}

#[derive(Debug, Serialize)]
struct LegalMonetaryTotal {
    #[serde(rename = "cbc:TaxExclusiveAmount")]
    tax_exclusive_amount: MonetaryAmount,
    #[serde(rename = "cbc:TaxInclusiveAmount")]
    tax_inclusive_amount: MonetaryAmount,
    #[serde(rename = "cbc:AllowanceTotalAmount")]
    allowance_total_amount: MonetaryAmount,
    #[serde(rename = "cbc:PayableAmount")]
    payable_amount: MonetaryAmount,
}

#[derive(Debug, Serialize)]
struct InvoiceLine {
    #[serde(rename = "cbc:ID")]
    id: String,
    #[serde(rename = "cbc:InvoicedQuantity")]
    invoiced_quantity: Quantity,
    #[serde(rename = "cbc:LineExtensionAmount")]
    line_extension_amount: MonetaryAmount,
    #[serde(rename = "cac:TaxTotal")]
    tax_total: LineTaxTotal,
    #[serde(rename = "cac:Item")]
    item: Item,
    #[serde(rename = "cac:Price")]
    price: Price,
}

#[derive(Debug, Serialize)]
struct Item {
    #[serde(rename = "cbc:Name")]
    name: String,
}

#[derive(Debug, Serialize)]
struct Price {
    #[serde(rename = "cbc:PriceAmount")]
    price_amount: MonetaryAmount,
    #[serde(rename = "cac:AllowanceCharge")]
    allowance_charge: AllowanceCharge,
}

// =============================================================================
// Mapping
// =============================================================================

impl Invoice {
    fn from_payload(payload: &FiscalPayload) -> Self {
        let currency = payload.currency_code.as_str();
        let seller = &payload.seller;
        let buyer = &payload.buyer;
        let totals = &payload.totals;

        Invoice {
            xmlns: INVOICE_NS,
            xmlns_cac: CAC_NS,
            xmlns_cbc: CBC_NS,
            xmlns_ext: EXT_NS,
            profile_id: PROFILE_ID,
            id: payload.identity.daily_id.clone(),
            uuid: payload.identity.uuid.to_string(),
            issue_date: payload.issue_date.format("%Y-%m-%d").to_string(),
            invoice_type_code: InvoiceTypeCode {
                name: payload.transaction_type.clone(),
                value: payload.invoice_type_code.clone(),
            },
            document_currency_code: currency.to_string(),
            tax_currency_code: currency.to_string(),
            billing_reference: payload.billing_reference.as_ref().map(|r| BillingReference {
                invoice_document_reference: InvoiceDocumentReference {
                    id: r.daily_id.clone(),
                    uuid: r.uuid.clone(),
                    document_description: r.total.to_string(),
                },
            }),
            additional_document_reference: DocumentReference {
                id: "ICV",
                uuid: payload.identity.audit_counter.to_string(),
            },
            accounting_supplier_party: SupplierParty {
                party: SellerPartyXml {
                    postal_address: PostalAddress {
                        postal_zone: seller.postal_code.clone(),
                        country_subentity_code: seller.region_code.clone(),
                        country: Country {
                            identification_code: seller.country_code.clone(),
                        },
                    },
                    party_tax_scheme: PartyTaxScheme {
                        company_id: Some(seller.tax_id.clone()),
                        tax_scheme: TaxScheme::vat(),
                    },
                    party_legal_entity: PartyLegalEntity {
                        registration_name: seller.name.clone(),
                    },
                },
            },
            accounting_customer_party: CustomerParty {
                party: BuyerPartyXml {
                    party_identification: PartyIdentification {
                        id: Code {
                            scheme_id: Some(buyer.id_scheme.clone()),
                            scheme_agency_id: None,
                            value: buyer.id_value.clone(),
                        },
                    },
                    postal_address: PostalAddress {
                        postal_zone: buyer.postal_code.clone(),
                        country_subentity_code: buyer.region_code.clone(),
                        country: Country {
                            identification_code: buyer.country_code.clone(),
                        },
                    },
                    party_tax_scheme: PartyTaxScheme {
                        company_id: None,
                        tax_scheme: TaxScheme::vat(),
                    },
                    party_legal_entity: PartyLegalEntity {
                        registration_name: buyer.name.clone(),
                    },
                },
                accounting_contact: AccountingContact {
                    telephone: buyer.phone.clone(),
                },
            },
            seller_supplier_party: SellerSupplierParty {
                party: IncomeSourceParty {
                    party_identification: PartyIdentification {
                        id: Code::plain(payload.income_source_sequence.clone()),
                    },
                },
            },
            allowance_charge: AllowanceCharge::discount("discount", currency, totals.allowance_total),
            tax_total: TaxTotal {
                tax_amount: MonetaryAmount::new(currency, totals.total_tax),
                tax_subtotals: payload
                    .tax_subtotals
                    .iter()
                    .map(|s| document_subtotal(currency, s))
                    .collect(),
            },
            legal_monetary_total: LegalMonetaryTotal {
                tax_exclusive_amount: MonetaryAmount::new(currency, totals.tax_exclusive),
                tax_inclusive_amount: MonetaryAmount::new(currency, totals.tax_inclusive),
                allowance_total_amount: MonetaryAmount::new(currency, totals.allowance_total),
                payable_amount: MonetaryAmount::new(currency, totals.payable),
            },
            invoice_lines: payload
                .lines
                .iter()
                .map(|l| invoice_line(currency, l))
                .collect(),
        }
    }
}

fn document_subtotal(currency: &str, subtotal: &TaxSubtotal) -> TaxSubtotalXml {
    TaxSubtotalXml {
        taxable_amount: MonetaryAmount::new(currency, subtotal.taxable_amount),
        tax_amount: MonetaryAmount::new(currency, subtotal.tax_amount),
        tax_category: TaxCategoryXml {
            id: Code::unece("UN/ECE 5305", subtotal.category.code()),
            percent: subtotal.percent.to_string(),
            tax_scheme: TaxScheme {
                id: Code::unece("UN/ECE 5153", TAX_SCHEME),
            },
        },
    }
}

fn invoice_line(currency: &str, line: &PayloadLine) -> InvoiceLine {
    InvoiceLine {
        id: line.index.to_string(),
        invoiced_quantity: Quantity {
            unit_code: line.uom_code.clone(),
            value: line.quantity.to_string(),
        },
        line_extension_amount: MonetaryAmount::new(currency, line.line_extension),
        tax_total: LineTaxTotal {
            tax_amount: MonetaryAmount::new(currency, line.tax_amount),
            rounding_amount: MonetaryAmount::new(currency, line.rounding_amount),
            tax_subtotal: TaxSubtotalXml {
                taxable_amount: MonetaryAmount::new(currency, line.line_extension),
                tax_amount: MonetaryAmount::new(currency, line.tax_amount),
                tax_category: TaxCategoryXml {
                    id: Code::plain(line.tax_category.code()),
                    percent: line.tax_rate.to_string(),
                    tax_scheme: TaxScheme::vat(),
                },
            },
        },
        item: Item {
            name: line.name.clone(),
        },
        price: Price {
            price_amount: MonetaryAmount::new(currency, line.unit_price),
            allowance_charge: AllowanceCharge::discount("DISCOUNT", currency, line.discount),
        },
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Renders the payload as UBL 2.1 XML, declaration included.
///
/// ## Errors
/// - `Render`: the serializer refused the document
pub fn render(payload: &FiscalPayload) -> CoreResult<String> {
    let mut out = String::from(XML_DECLARATION);
    let mut serializer = Serializer::new(&mut out);
    serializer.indent(' ', 4);

    Invoice::from_payload(payload)
        .serialize(serializer)
        .map_err(|e| CoreError::Render(e.to_string()))?;

    Ok(out)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{build, BuildContext};
    use crate::types::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn sample() -> FiscalPayload {
        let mut tenant = TenantFiscalConfig::new("t1", "ACME", "Acme & Sons");
        tenant.seller.tax_id = "1234567".into();
        let doc = FiscalDocument {
            document_ref: "SINV-0001".into(),
            tenant_ref: "t1".into(),
            kind: DocumentKind::Invoice,
            finalized: true,
            is_pos: true,
            payment_terms: PaymentTerms::Cash,
            buyer: Buyer {
                name: "Walk-in <cash>".into(),
                ..Default::default()
            },
            lines: vec![
                LineItem {
                    name: "Tea".into(),
                    quantity: "3".parse().unwrap(),
                    unit_price: "0.335".parse().unwrap(),
                    uom: "Nos".into(),
                    tax_rate: "16".parse().unwrap(),
                    tax_category: Some(TaxCategory::Standard),
                    discount: Amount::ZERO,
                },
                LineItem {
                    name: "Bread".into(),
                    quantity: "1".parse().unwrap(),
                    unit_price: "1".parse().unwrap(),
                    uom: "Kg".into(),
                    tax_rate: Amount::ZERO,
                    tax_category: Some(TaxCategory::ZeroExempt),
                    discount: Amount::ZERO,
                },
            ],
            discount: Amount::ZERO,
            reversal_of: None,
            identity: None,
            status: DocumentStatus::Pending,
            qr_artifact: None,
            last_error_kind: None,
            last_error_retryable: false,
            attempts: 0,
        };
        let identity = Identity {
            daily_id: "ACME-2024-03-01-00001".into(),
            uuid: Uuid::nil(),
            audit_counter: 100,
        };
        let ctx = BuildContext {
            tenant: &tenant,
            original: None,
            issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        build(&doc, &identity, &ctx).unwrap()
    }

    fn xml() -> String {
        render(&sample()).unwrap()
    }

    #[test]
    fn test_render_carries_identity_and_counter() {
        let xml = xml();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<cbc:ID>ACME-2024-03-01-00001</cbc:ID>"));
        assert!(xml.contains("<cbc:UUID>00000000-0000-0000-0000-000000000000</cbc:UUID>"));
        assert!(xml.contains("<cbc:ID>ICV</cbc:ID>"));
        assert!(xml.contains("<cbc:UUID>100</cbc:UUID>"));
        assert!(xml.contains("<cbc:InvoiceTypeCode name=\"012\">388</cbc:InvoiceTypeCode>"));
        assert!(xml.trim_end().ends_with("</Invoice>"));
    }

    #[test]
    fn test_render_nine_decimal_amounts() {
        let xml = xml();
        assert!(xml.contains(
            "<cbc:LineExtensionAmount currencyID=\"JOD\">1.005000000</cbc:LineExtensionAmount>"
        ));
        assert!(xml.contains("<cbc:InvoicedQuantity unitCode=\"KGM\">1.000000000</cbc:InvoicedQuantity>"));
    }

    #[test]
    fn test_render_one_subtotal_per_category() {
        let xml = xml();
        // Two document-level blocks plus one per line.
        assert_eq!(xml.matches("<cac:TaxSubtotal>").count(), 4);
    }

    #[test]
    fn test_render_escapes_text() {
        let xml = xml();
        assert!(xml.contains("Acme &amp; Sons"));
        assert!(xml.contains("Walk-in &lt;cash"));
        assert!(!xml.contains("<cac:BillingReference>"));
    }

    #[test]
    fn test_render_credit_note_reference_and_schemes() {
        let mut payload = sample();
        payload.billing_reference = Some(crate::payload::BillingReference {
            daily_id: "ACME-2024-02-28-00007".into(),
            uuid: "5f0c6a2e-0000-4000-8000-000000000001".into(),
            total: "1.005".parse().unwrap(),
        });
        let xml = render(&payload).unwrap();
        assert!(xml.contains("<cac:BillingReference>"));
        assert!(xml.contains("<cbc:ID>ACME-2024-02-28-00007</cbc:ID>"));
        assert!(xml.contains("<cbc:DocumentDescription>1.005000000</cbc:DocumentDescription>"));
        assert!(xml.contains("schemeID=\"UN/ECE 5305\""));
        assert!(xml.contains("<cbc:ChargeIndicator>false</cbc:ChargeIndicator>"));
    }
}
