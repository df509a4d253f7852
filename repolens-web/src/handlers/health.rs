//! Health and liveness handlers

use super::types::{HealthResponse, PingResponse, ServiceStatuses};
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::Json};

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    summary = "Health check",
    responses(
        (status = 200, description = "All services are up", body = HealthResponse),
        (status = 503, description = "One or more services are down", body = HealthResponse)
    )
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let health = state.service.health().await;

    let status = if health.all_up() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        status: if health.all_up() {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        timestamp: chrono::Utc::now(),
        services: ServiceStatuses {
            database: health.database,
            queue: health.queue,
        },
    };

    (status, Json(body))
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/api/v1/ping",
    tag = "Health",
    summary = "Liveness probe",
    responses((status = 200, description = "Server is reachable", body = PingResponse))
)]
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        message: "pong".to_string(),
        timestamp: chrono::Utc::now(),
    })
}
