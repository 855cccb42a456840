use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::interview::machine::Rejection;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// No scenario parameters were supplied; the caller must go back to setup.
    #[error("No scenario supplied")]
    NoScenario,

    /// Usage credit exhausted; the session must not be created.
    #[error("No interview credits remaining")]
    OutOfCredits,

    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Remote analysis error: {0}")]
    Gateway(#[from] GatewayError),

    /// Every scoring request in an assessment run failed.
    #[error("Analysis failed for every answered question")]
    AnalysisFailed,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::NoScenario => (
                StatusCode::BAD_REQUEST,
                "NO_SCENARIO",
                "No interview scenario supplied. Set one up first.".to_string(),
            ),
            AppError::OutOfCredits => (
                StatusCode::PAYMENT_REQUIRED,
                "OUT_OF_CREDITS",
                "You have used all your free interview simulations.".to_string(),
            ),
            AppError::Rejected(rejection) => {
                (StatusCode::CONFLICT, "EVENT_REJECTED", rejection.to_string())
            }
            AppError::Gateway(e) => {
                tracing::error!("Gateway error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "REMOTE_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::AnalysisFailed => (
                StatusCode::BAD_GATEWAY,
                "ANALYSIS_FAILED",
                "None of the answers could be analyzed. Please try again.".to_string(),
            ),
            AppError::Storage(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
