use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use livequote_agent::ConsultationRuntime;
use tower_http::cors::{Any, CorsLayer};

use crate::{events, health, recommendations, sessions};

#[derive(Clone)]
pub struct ApiState {
    pub runtime: Arc<ConsultationRuntime>,
}

pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/quote-events", get(events::subscribe).post(events::submit))
        .route("/api/equipment", get(sessions::equipment))
        .route("/api/ai/equipment-recommendations", post(recommendations::recommend))
        .route("/api/sessions", post(sessions::create))
        .route("/api/sessions/{id}", delete(sessions::teardown))
        .route("/api/sessions/{id}/start", post(sessions::start))
        .route("/api/sessions/{id}/messages", post(sessions::message))
        .route("/api/sessions/{id}/quantity", post(sessions::quantity))
        .route("/api/sessions/{id}/quote", get(sessions::quote))
        .route("/api/sessions/{id}/resync", post(sessions::resync))
        .route("/api/sessions/{id}/turns", get(sessions::turns))
        .route("/api/sessions/{id}/conclude", post(sessions::conclude))
        .route("/api/sessions/{id}/finalize", post(sessions::finalize))
        .with_state(state)
}

/// The full HTTP surface: API routes, readiness, and permissive CORS for
/// browser clients on other origins.
pub fn app(state: ApiState, health: health::HealthState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    api_router(state).merge(health::router(health)).layer(cors)
}
