use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::orchestrator::OrchestratorError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`OrchestratorError`] for run-request failures and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce
/// consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A run request was rejected before anything was spawned.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// A request body failed validation.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Orchestrator(err) => match err {
                OrchestratorError::ConnectionNotFound(_) => {
                    (StatusCode::NOT_FOUND, "CONNECTION_NOT_FOUND", err.to_string())
                }
                OrchestratorError::JobNotFound(_) => {
                    (StatusCode::NOT_FOUND, "JOB_NOT_FOUND", err.to_string())
                }
            },
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
