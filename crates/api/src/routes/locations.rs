//! Device location and permission reports.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use domain::models::{LocationPermission, ReportPermissionRequest, ReportPositionRequest};
use serde::Serialize;
use tracing::{debug, info};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Caller;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPositionResponse {
    /// Number of live subscriptions the position was fanned out to.
    pub delivered: usize,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPermissionResponse {
    pub background: LocationPermission,
    /// Whether an active alert was re-armed by this report.
    pub resumed: bool,
}

/// Feed one device position to the geofence monitor and location pipeline.
///
/// POST /api/v1/locations
pub async fn report_position(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<ReportPositionRequest>,
) -> Result<(StatusCode, Json<ReportPositionResponse>), ApiError> {
    request.validate()?;

    let position = request.into_position(Utc::now());
    let delivered = state.locations.report_position(caller.id(), position);

    debug!(
        user_id = %caller.id(),
        delivered = delivered,
        "Position reported"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(ReportPositionResponse {
            delivered,
            recorded_at: position.recorded_at,
        }),
    ))
}

/// Record the device's background-location permission. A grant re-arms the
/// caller's active alert if its geofence is not running.
///
/// PUT /api/v1/locations/permission
pub async fn report_permission(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<ReportPermissionRequest>,
) -> Result<Json<ReportPermissionResponse>, ApiError> {
    state
        .locations
        .set_permission(caller.id(), request.background);

    let resumed = if request.background.is_granted() {
        state.engine.resume_tracking(caller.id()).await?
    } else {
        false
    };

    info!(
        user_id = %caller.id(),
        background = ?request.background,
        resumed = resumed,
        "Location permission reported"
    );

    Ok(Json(ReportPermissionResponse {
        background: request.background,
        resumed,
    }))
}
