pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::assessment::handlers as assessment;
use crate::interview::handlers as interview;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Usage credits
        .route("/api/v1/credits", get(interview::handle_get_credits))
        .route(
            "/api/v1/credits/purchase",
            post(interview::handle_purchase_credits),
        )
        // Scenario setup
        .route("/api/v1/personas", post(interview::handle_generate_persona))
        .route("/api/v1/scenarios", post(interview::handle_submit_scenario))
        // Live sessions
        .route("/api/v1/sessions", post(interview::handle_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(interview::handle_get_session).delete(interview::handle_delete_session),
        )
        .route(
            "/api/v1/sessions/:id/events",
            post(interview::handle_session_event),
        )
        // Report
        .route(
            "/api/v1/assessments",
            post(assessment::handle_create_assessment),
        )
        .with_state(state)
}
