//! Tenant onboarding.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use fotara_core::{CounterState, TenantFiscalConfig};
use fotara_db::{TenantCredentials, TenantRecord, TenantUpsert};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TenantRequest {
    pub config: TenantFiscalConfig,
    /// Omitted credentials keep the stored ones.
    #[serde(default)]
    pub credentials: Option<TenantCredentials>,
    /// Last counter issued outside this system. Only raises the floor.
    #[serde(default)]
    pub starter_counter: i64,
}

/// Tenant as returned to callers. Credentials are never echoed.
#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub config: TenantFiscalConfig,
    pub counters: CounterState,
    pub has_credentials: bool,
}

impl From<TenantRecord> for TenantResponse {
    fn from(record: TenantRecord) -> Self {
        TenantResponse {
            has_credentials: record.credentials.is_some(),
            config: record.config,
            counters: record.counters,
        }
    }
}

pub async fn upsert_tenant(
    State(state): State<AppState>,
    Path(tenant_ref): Path<String>,
    Json(request): Json<TenantRequest>,
) -> ApiResult<Json<TenantResponse>> {
    if request.config.tenant_ref != tenant_ref {
        return Err(ApiError::InvalidRequest(format!(
            "body tenant_ref '{}' does not match path '{}'",
            request.config.tenant_ref, tenant_ref
        )));
    }

    let record = state
        .orchestrator
        .upsert_tenant(&TenantUpsert {
            config: request.config,
            credentials: request.credentials,
            starter_counter: request.starter_counter,
        })
        .await?;

    Ok(Json(record.into()))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    Path(tenant_ref): Path<String>,
) -> ApiResult<Json<TenantResponse>> {
    Ok(Json(state.orchestrator.tenant(&tenant_ref).await?.into()))
}
