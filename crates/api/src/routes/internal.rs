//! Internal endpoints for outside schedulers.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackSweepResponse {
    pub scanned: usize,
    pub triggered: usize,
    pub lost: usize,
    pub errors: usize,
}

/// Fire the fallback for every active alert past its deadline.
///
/// POST /api/v1/internal/fallback-sweep
pub async fn run_fallback_sweep(
    State(state): State<AppState>,
) -> Result<Json<FallbackSweepResponse>, ApiError> {
    let report = state.engine.sweep_overdue(Utc::now()).await?;
    Ok(Json(FallbackSweepResponse {
        scanned: report.scanned,
        triggered: report.triggered,
        lost: report.lost,
        errors: report.errors,
    }))
}
