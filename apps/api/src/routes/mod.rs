pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::features::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Gated AI features
        .route("/api/v1/career/analyze", post(handlers::handle_career_analyze))
        .route("/api/v1/projects/ideas", post(handlers::handle_project_ideas))
        .route("/api/v1/jobs/search", post(handlers::handle_job_search))
        .route("/api/v1/search", post(handlers::handle_ai_search))
        // Entitlement reads for UI display
        .route("/api/v1/entitlements", get(handlers::handle_entitlements))
        .route("/api/v1/usage", get(handlers::handle_usage))
        .with_state(state)
}
