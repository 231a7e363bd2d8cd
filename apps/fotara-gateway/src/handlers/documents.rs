//! Document intake, submission and queries.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use fotara_core::{DocumentProjection, FiscalDocument, SubmissionLogEntry, SubmissionMode};
use fotara_submit::SubmissionReport;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Body of a submit call. Without a body the call counts as manual.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub mode: SubmissionMode,
}

#[derive(Debug, Serialize)]
pub struct CancellableResponse {
    pub document_ref: String,
    pub cancellable: bool,
}

pub async fn upsert_document(
    State(state): State<AppState>,
    Path(document_ref): Path<String>,
    Json(document): Json<FiscalDocument>,
) -> ApiResult<Json<DocumentProjection>> {
    if document.document_ref != document_ref {
        return Err(ApiError::InvalidRequest(format!(
            "body document_ref '{}' does not match path '{}'",
            document.document_ref, document_ref
        )));
    }

    let stored = state.orchestrator.upsert_document(&document).await?;
    Ok(Json(stored.projection()))
}

pub async fn submit_document(
    State(state): State<AppState>,
    Path(document_ref): Path<String>,
    request: Option<Json<SubmitRequest>>,
) -> ApiResult<Json<SubmissionReport>> {
    let mode = request
        .map(|Json(r)| r.mode)
        .unwrap_or(SubmissionMode::Manual);
    let report = state.orchestrator.submit(&document_ref, mode).await?;
    Ok(Json(report))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_ref): Path<String>,
) -> ApiResult<Json<DocumentProjection>> {
    Ok(Json(state.orchestrator.projection(&document_ref).await?))
}

pub async fn list_logs(
    State(state): State<AppState>,
    Path(document_ref): Path<String>,
) -> ApiResult<Json<Vec<SubmissionLogEntry>>> {
    Ok(Json(state.orchestrator.logs(&document_ref).await?))
}

pub async fn cancellable(
    State(state): State<AppState>,
    Path(document_ref): Path<String>,
) -> ApiResult<Json<CancellableResponse>> {
    let cancellable = state.orchestrator.cancellable(&document_ref).await?;
    Ok(Json(CancellableResponse {
        document_ref,
        cancellable,
    }))
}
