//! Health check endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::app::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// `postgres` or `memory`.
    pub storage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseHealth>,
    pub tracking: TrackingHealth,
}

/// Database health status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseHealth {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// Engine configuration summary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TrackingHealth {
    pub sweep_enabled: bool,
    pub sweep_interval_secs: u64,
    pub push_provider: String,
}

/// Simple status response for liveness/readiness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

async fn check_database(state: &AppState) -> Option<DatabaseHealth> {
    let pool = state.pool.as_ref()?;
    let start = std::time::Instant::now();
    let connected = persistence::db::ping(pool).await.is_ok();
    let latency_ms = start.elapsed().as_millis() as u64;
    Some(DatabaseHealth {
        connected,
        latency_ms: connected.then_some(latency_ms),
    })
}

/// Full health check endpoint.
///
/// GET /api/health
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let database = check_database(&state).await;
    let healthy = database.as_ref().map(|db| db.connected).unwrap_or(true);

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: if state.pool.is_some() { "postgres" } else { "memory" }.to_string(),
        database,
        tracking: TrackingHealth {
            sweep_enabled: state.config.sweep.enabled,
            sweep_interval_secs: state.config.sweep.interval_secs,
            push_provider: state.config.push.provider.clone(),
        },
    };

    if healthy {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Liveness probe endpoint.
///
/// GET /api/health/live
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint: ready once storage answers.
///
/// GET /api/health/ready
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    let connected = check_database(&state)
        .await
        .map(|db| db.connected)
        .unwrap_or(true);

    if connected {
        Ok(Json(StatusResponse {
            status: "ready".to_string(),
        }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
