//! Error responses of the gateway.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use fotara_db::DbError;
use fotara_submit::SubmitError;

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Upper-case error kind, e.g. `LOCK_TIMEOUT`.
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let ApiError::Submit(err) = self else {
            return StatusCode::BAD_REQUEST;
        };

        match err {
            SubmitError::NotFound { .. } => StatusCode::NOT_FOUND,
            SubmitError::Validation(_)
            | SubmitError::Build(_)
            | SubmitError::MissingCredentials { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SubmitError::TenantDisabled { .. } | SubmitError::DocumentNotFinalized { .. } => {
                StatusCode::CONFLICT
            }
            SubmitError::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SubmitError::TransportFailure(_)
            | SubmitError::TransportTimeout(_)
            | SubmitError::EndpointRejected { .. } => StatusCode::BAD_GATEWAY,
            SubmitError::Storage(DbError::Immutable { .. })
            | SubmitError::Storage(DbError::UniqueViolation { .. }) => StatusCode::CONFLICT,
            SubmitError::Storage(db) if db.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            SubmitError::Storage(_)
            | SubmitError::InvalidConfig(_)
            | SubmitError::ConfigLoadFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Submit(SubmitError::Storage(DbError::Immutable { .. })) => ErrorBody {
                code: "IMMUTABLE".to_string(),
                message: self.to_string(),
                retryable: false,
            },
            ApiError::Submit(err) => ErrorBody {
                code: err.kind().to_uppercase(),
                message: err.to_string(),
                retryable: err.is_retryable(),
            },
            ApiError::InvalidRequest(msg) => ErrorBody {
                code: "INVALID_REQUEST".to_string(),
                message: msg.clone(),
                retryable: false,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request refused");
        }
        (status, Json(self.body())).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
