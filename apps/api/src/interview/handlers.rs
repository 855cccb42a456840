//! Axum route handlers for scenarios, credits, personas and live sessions.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::gateway::models::{PersonaRequest, PersonaResponse};
use crate::interview::machine::ClientEvent;
use crate::interview::models::Scenario;
use crate::interview::orchestrator::{SessionOrchestrator, SessionSnapshot};
use crate::interview::scenario::{self, ScenarioForm, SubmittedScenario};
use crate::state::AppState;
use crate::store::ticket;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub user_id: String,
    pub remaining: u32,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub user_id: String,
    pub amount: u32,
}

#[derive(Debug, Deserialize)]
pub struct SubmitScenarioRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub form: ScenarioForm,
}

#[derive(Debug, Serialize)]
pub struct SubmitScenarioResponse {
    #[serde(flatten)]
    pub submitted: SubmittedScenario,
    /// Single-use pass for `POST /api/v1/sessions`.
    pub ticket: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    /// Flat scenario parameters as returned by `POST /api/v1/scenarios`.
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub ticket: Option<Uuid>,
}

fn require_user(user_id: &str) -> Result<(), AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id is required".to_string()));
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/credits?user_id=
pub async fn handle_get_credits(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<CreditsResponse>, AppError> {
    require_user(&query.user_id)?;
    let remaining = state.credits.get(&query.user_id).await?;
    Ok(Json(CreditsResponse {
        user_id: query.user_id,
        remaining,
    }))
}

/// POST /api/v1/credits/purchase
///
/// Simulated purchase: tops the counter up by `amount`.
pub async fn handle_purchase_credits(
    State(state): State<AppState>,
    Json(request): Json<PurchaseRequest>,
) -> Result<Json<CreditsResponse>, AppError> {
    require_user(&request.user_id)?;
    if request.amount == 0 {
        return Err(AppError::Validation("amount must be at least 1".to_string()));
    }
    let remaining = state.credits.add(&request.user_id, request.amount).await?;
    info!(
        "User {} purchased {} interview credits ({} now)",
        request.user_id, request.amount, remaining
    );
    Ok(Json(CreditsResponse {
        user_id: request.user_id,
        remaining,
    }))
}

/// POST /api/v1/personas
pub async fn handle_generate_persona(
    State(state): State<AppState>,
    Json(request): Json<PersonaRequest>,
) -> Result<Json<PersonaResponse>, AppError> {
    if request.company.trim().is_empty() || request.role.trim().is_empty() {
        return Err(AppError::Validation(
            "company and role are required".to_string(),
        ));
    }
    let persona_description = state.gateway.generate_persona(&request).await?;
    Ok(Json(PersonaResponse {
        persona_description,
    }))
}

/// POST /api/v1/scenarios
///
/// Validates the setup form and spends one credit. Returns the session entry
/// parameters and the ticket for `POST /api/v1/sessions`.
pub async fn handle_submit_scenario(
    State(state): State<AppState>,
    Json(request): Json<SubmitScenarioRequest>,
) -> Result<Json<SubmitScenarioResponse>, AppError> {
    let submitted = scenario::submit(&state.credits, &request.user_id, request.form).await?;
    let ticket = ticket::issue(state.store.as_ref(), &request.user_id)
        .await
        .map_err(|e| {
            error!(
                "Credit spent but no session ticket issued for {}: {e}",
                request.user_id
            );
            e
        })?;
    Ok(Json(SubmitScenarioResponse { submitted, ticket }))
}

/// POST /api/v1/sessions
///
/// Needs an unused ticket from `POST /api/v1/scenarios`; without one the
/// request is treated as unpaid.
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    require_user(&request.user_id)?;
    let scenario = Scenario::from_params(&request.params)?;

    let paid = match request.ticket {
        Some(id) => ticket::redeem(state.store.as_ref(), &request.user_id, id).await?,
        None => false,
    };
    if !paid {
        info!("Session refused for {}: no valid ticket", request.user_id);
        return Err(AppError::OutOfCredits);
    }

    let session = SessionOrchestrator::start(
        request.user_id,
        scenario,
        state.policy,
        state.gateway.clone(),
        state.store.clone(),
    );
    let snapshot = session.snapshot().await;
    state.sessions.insert(session).await;

    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/v1/sessions/:id
///
/// Terminal sessions stay readable until the registry sweep drops them.
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;
    Ok(Json(session.snapshot().await))
}

/// POST /api/v1/sessions/:id/events
pub async fn handle_session_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(event): Json<ClientEvent>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;
    let snapshot = session.dispatch(event.into()).await?;
    Ok(Json(snapshot))
}

/// DELETE /api/v1/sessions/:id
///
/// Navigation away: clears the auto-advance timer and drops late results.
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state
        .sessions
        .remove(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;
    Ok(Json(session.teardown().await))
}
