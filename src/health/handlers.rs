use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::error;

use crate::{registry::HealthStatus, state::AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
    pub uptime: String,
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

/// Target of the catalog's active HTTP check.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, code) = match state.registry.health_check().await {
        HealthStatus::Healthy => ("healthy", StatusCode::OK),
        HealthStatus::Unhealthy(reason) => {
            error!(%reason, "health check failed - redis");
            ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
        }
    };

    (
        code,
        Json(HealthResponse {
            status,
            service: state.config.service.name.clone(),
            version: env!("CARGO_PKG_VERSION"),
            uptime: format_uptime(state.started_at.elapsed()),
        }),
    )
}

pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ProbeResponse>) {
    match state.registry.health_check().await {
        HealthStatus::Healthy => (
            StatusCode::OK,
            Json(ProbeResponse {
                status: "ready",
                service: Some(state.config.service.name.clone()),
                error: None,
            }),
        ),
        HealthStatus::Unhealthy(reason) => {
            error!(%reason, "readiness check failed - redis");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ProbeResponse {
                    status: "not ready",
                    service: None,
                    error: Some("Redis connection failed"),
                }),
            )
        }
    }
}

/// Answers as long as the process is up.
pub async fn liveness_check(State(state): State<AppState>) -> Json<ProbeResponse> {
    Json(ProbeResponse {
        status: "alive",
        service: Some(state.config.service.name.clone()),
        error: None,
    })
}

fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}
