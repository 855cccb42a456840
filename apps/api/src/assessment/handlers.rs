//! Axum route handlers for the Assessment API.

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::assessment::aggregator::{aggregate, AggregateOutcome, AssessmentReport};
use crate::errors::AppError;
use crate::store::handoff;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AssessmentRequest {
    pub user_id: String,
}

/// POST /api/v1/assessments
///
/// Scores the user's last finished interview. A missing or unreadable
/// handoff record is a 404; the client should send the user back to setup.
pub async fn handle_create_assessment(
    State(state): State<AppState>,
    Json(request): Json<AssessmentRequest>,
) -> Result<Json<AssessmentReport>, AppError> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id is required".to_string()));
    }

    let data = handoff::load(state.store.as_ref(), &request.user_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No interview data found for user {}",
                request.user_id
            ))
        })?;

    match aggregate(state.gateway.as_ref(), &data, state.assessment_style).await {
        AggregateOutcome::Report(report) => Ok(Json(report)),
        AggregateOutcome::AnalysisFailed { .. } => Err(AppError::AnalysisFailed),
    }
}
