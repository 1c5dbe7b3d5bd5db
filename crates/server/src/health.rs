use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use livequote_agent::ConsultationRuntime;
use livequote_db::{migrations, ping, DbPool};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub runtime: Arc<ConsultationRuntime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub sessions: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "livequote-server runtime initialized".to_string(),
        },
        database,
        sessions: sessions_check(&state.runtime).await,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    if let Err(error) = ping(pool).await {
        return HealthCheck {
            status: "degraded",
            detail: format!("database query failed: {error}"),
        };
    }

    match migrations::status(pool).await {
        Ok(status) if status.is_current() => HealthCheck {
            status: "ready",
            detail: format!("database reachable, {} migrations applied", status.applied),
        },
        Ok(status) => HealthCheck {
            status: "degraded",
            detail: format!("{} of {} migrations applied", status.applied, status.known),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("migration status unavailable: {error}"),
        },
    }
}

async fn sessions_check(runtime: &ConsultationRuntime) -> HealthCheck {
    HealthCheck {
        status: "ready",
        detail: format!(
            "{} active sessions, {} connected streams",
            runtime.session_count().await,
            runtime.registry().connected_sessions()
        ),
    }
}
