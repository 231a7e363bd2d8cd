//! # Fotara Gateway
//!
//! HTTP front of the submission pipeline.
//!
//! ## Routes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Gateway Routes                                │
//! │                                                                         │
//! │  GET  /health                                  store reachable?         │
//! │                                                                         │
//! │  PUT  /v1/tenants/{tenant_ref}                 onboard / update         │
//! │  GET  /v1/tenants/{tenant_ref}                 settings + counters      │
//! │                                                                         │
//! │  PUT  /v1/documents/{document_ref}             store host document      │
//! │  POST /v1/documents/{document_ref}/submit      {"mode": auto|manual}    │
//! │  GET  /v1/documents/{document_ref}             projection               │
//! │  GET  /v1/documents/{document_ref}/logs        submission log           │
//! │  GET  /v1/documents/{document_ref}/cancellable host may cancel?         │
//! │                                                                         │
//! │  Attempt failures come back as 200 with the report's `error` set.      │
//! │  Refusals before an attempt are error responses {code, message}.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Loaded by [`fotara_submit::SubmitConfig`]. Environment variables:
//! - `DATABASE_URL` - PostgreSQL connection string (required)
//! - `FOTARA_STORAGE` - `memory` for tests and local development only
//! - `FOTARA_ENDPOINT_URL` - government endpoint
//! - `FOTARA_PORT` - HTTP port (default: 8080)
//! - `FOTARA_REDRIVE_ENABLED` - start the redrive worker

pub mod error;
pub mod handlers;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use fotara_submit::SubmissionOrchestrator;

pub use error::{ApiError, ApiResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SubmissionOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<SubmissionOrchestrator>) -> Self {
        AppState { orchestrator }
    }
}

/// Builds the gateway router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/v1/tenants/{tenant_ref}",
            put(handlers::tenants::upsert_tenant).get(handlers::tenants::get_tenant),
        )
        .route(
            "/v1/documents/{document_ref}",
            put(handlers::documents::upsert_document).get(handlers::documents::get_document),
        )
        .route(
            "/v1/documents/{document_ref}/submit",
            post(handlers::documents::submit_document),
        )
        .route(
            "/v1/documents/{document_ref}/logs",
            get(handlers::documents::list_logs),
        )
        .route(
            "/v1/documents/{document_ref}/cancellable",
            get(handlers::documents::cancellable),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
