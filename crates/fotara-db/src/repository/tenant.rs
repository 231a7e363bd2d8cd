//! # Tenant Repository
//!
//! Tenant settings, endpoint credentials and counters.
//!
//! Counters are read here but only written by the allocation transaction
//! in [`DocumentRepository`](super::document::DocumentRepository). An
//! upsert may move the starter counter; it never touches the latest
//! issued counter or the daily sequence.

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::{debug, info};

use fotara_core::{CounterState, SellerProfile, TenantFiscalConfig};

use crate::error::DbResult;
use crate::store::{TenantCredentials, TenantRecord, TenantUpsert};

pub(crate) const TENANT_COLUMNS: &str = r#"
    tenant_ref, abbreviation, enabled, auto_send_on_finalize, branch_id,
    default_region_code, country_code, currency_code,
    seller_name, seller_tax_id, seller_postal_code,
    buyer_id_threshold, uom_mapping, client_id, secret_key,
    starter_counter, latest_issued_counter, last_daily_seq_date, last_daily_seq_number
"#;

/// Row shape of `fiscal_tenants`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TenantRow {
    pub tenant_ref: String,
    pub abbreviation: String,
    pub enabled: bool,
    pub auto_send_on_finalize: bool,
    pub branch_id: String,
    pub default_region_code: String,
    pub country_code: String,
    pub currency_code: String,
    pub seller_name: String,
    pub seller_tax_id: String,
    pub seller_postal_code: String,
    pub buyer_id_threshold: Decimal,
    pub uom_mapping: Json<BTreeMap<String, String>>,
    pub client_id: Option<String>,
    pub secret_key: Option<String>,
    pub starter_counter: i64,
    pub latest_issued_counter: i64,
    pub last_daily_seq_date: Option<chrono::NaiveDate>,
    pub last_daily_seq_number: i64,
}

impl TenantRow {
    pub fn counters(&self) -> CounterState {
        CounterState {
            starter_counter: self.starter_counter,
            latest_issued_counter: self.latest_issued_counter,
            last_daily_seq_date: self.last_daily_seq_date,
            last_daily_seq_number: self.last_daily_seq_number,
        }
    }
}

impl From<TenantRow> for TenantRecord {
    fn from(row: TenantRow) -> Self {
        let counters = row.counters();
        let credentials = match (row.client_id, row.secret_key) {
            (Some(client_id), Some(secret_key)) => Some(TenantCredentials {
                client_id,
                secret_key: Secret::new(secret_key),
            }),
            _ => None,
        };

        TenantRecord {
            config: TenantFiscalConfig {
                tenant_ref: row.tenant_ref,
                abbreviation: row.abbreviation,
                enabled: row.enabled,
                auto_send_on_finalize: row.auto_send_on_finalize,
                branch_id: row.branch_id,
                default_region_code: row.default_region_code,
                country_code: row.country_code,
                currency_code: row.currency_code,
                seller: SellerProfile {
                    name: row.seller_name,
                    tax_id: row.seller_tax_id,
                    postal_code: row.seller_postal_code,
                },
                buyer_id_threshold: row.buyer_id_threshold.into(),
                uom_mapping: row.uom_mapping.0,
            },
            counters,
            credentials,
        }
    }
}

/// Repository for tenant operations.
#[derive(Debug, Clone)]
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    /// Creates a new TenantRepository.
    pub fn new(pool: PgPool) -> Self {
        TenantRepository { pool }
    }

    /// Creates or updates a tenant.
    ///
    /// Credentials are replaced only when supplied.
    pub async fn upsert(&self, upsert: &TenantUpsert) -> DbResult<TenantRecord> {
        let config = &upsert.config;
        let (client_id, secret_key) = match &upsert.credentials {
            Some(c) => (
                Some(c.client_id.clone()),
                Some(c.secret_key.expose_secret().clone()),
            ),
            None => (None, None),
        };

        debug!(tenant_ref = %config.tenant_ref, "Upserting tenant");

        let sql = format!(
            r#"
            INSERT INTO fiscal_tenants (
                tenant_ref, abbreviation, enabled, auto_send_on_finalize, branch_id,
                default_region_code, country_code, currency_code,
                seller_name, seller_tax_id, seller_postal_code,
                buyer_id_threshold, uom_mapping, client_id, secret_key, starter_counter
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (tenant_ref) DO UPDATE SET
                abbreviation = EXCLUDED.abbreviation,
                enabled = EXCLUDED.enabled,
                auto_send_on_finalize = EXCLUDED.auto_send_on_finalize,
                branch_id = EXCLUDED.branch_id,
                default_region_code = EXCLUDED.default_region_code,
                country_code = EXCLUDED.country_code,
                currency_code = EXCLUDED.currency_code,
                seller_name = EXCLUDED.seller_name,
                seller_tax_id = EXCLUDED.seller_tax_id,
                seller_postal_code = EXCLUDED.seller_postal_code,
                buyer_id_threshold = EXCLUDED.buyer_id_threshold,
                uom_mapping = EXCLUDED.uom_mapping,
                client_id = COALESCE(EXCLUDED.client_id, fiscal_tenants.client_id),
                secret_key = COALESCE(EXCLUDED.secret_key, fiscal_tenants.secret_key),
                starter_counter = EXCLUDED.starter_counter,
                updated_at = NOW()
            RETURNING {}
            "#,
            TENANT_COLUMNS
        );

        let row = sqlx::query_as::<_, TenantRow>(&sql)
            .bind(&config.tenant_ref)
            .bind(&config.abbreviation)
            .bind(config.enabled)
            .bind(config.auto_send_on_finalize)
            .bind(&config.branch_id)
            .bind(&config.default_region_code)
            .bind(&config.country_code)
            .bind(&config.currency_code)
            .bind(&config.seller.name)
            .bind(&config.seller.tax_id)
            .bind(&config.seller.postal_code)
            .bind(config.buyer_id_threshold.value())
            .bind(Json(&config.uom_mapping))
            .bind(client_id)
            .bind(secret_key)
            .bind(upsert.starter_counter)
            .fetch_one(&self.pool)
            .await?;

        info!(tenant_ref = %config.tenant_ref, enabled = config.enabled, "Tenant saved");
        Ok(row.into())
    }

    /// Gets a tenant by reference.
    pub async fn get(&self, tenant_ref: &str) -> DbResult<Option<TenantRecord>> {
        let sql = format!(
            "SELECT {} FROM fiscal_tenants WHERE tenant_ref = $1",
            TENANT_COLUMNS
        );

        let row = sqlx::query_as::<_, TenantRow>(&sql)
            .bind(tenant_ref)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(TenantRecord::from))
    }
}
