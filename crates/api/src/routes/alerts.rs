//! Alert endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use domain::models::{
    AlertDetailResponse, AlertHistoryQuery, AlertResponse, CreateAlertRequest, ListAlertsResponse,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Caller;

/// Create an alert for the caller and start tracking it.
///
/// POST /api/v1/alerts
pub async fn create_alert(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateAlertRequest>,
) -> Result<(StatusCode, Json<AlertResponse>), ApiError> {
    request.validate()?;

    let alert = state.engine.create_alert(caller.id(), request).await?;

    info!(
        alert_id = %alert.id,
        owner_id = %alert.owner_id,
        fallback_at = %alert.fallback_at,
        "Alert created"
    );

    Ok((StatusCode::CREATED, Json(alert.into())))
}

/// The caller's active alert, or `null`.
///
/// GET /api/v1/alerts/active
pub async fn get_active_alert(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Option<AlertResponse>>, ApiError> {
    let alert = state.engine.active_alert(caller.id()).await?;
    Ok(Json(alert.map(AlertResponse::from)))
}

/// The caller's finished alerts, newest first.
///
/// GET /api/v1/alerts/history?limit=20
pub async fn get_alert_history(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<AlertHistoryQuery>,
) -> Result<Json<ListAlertsResponse>, ApiError> {
    let alerts: Vec<AlertResponse> = state
        .engine
        .history(caller.id(), query.limit)
        .await?
        .into_iter()
        .map(AlertResponse::from)
        .collect();

    let total = alerts.len();
    Ok(Json(ListAlertsResponse { alerts, total }))
}

/// One alert with its recipients. Visible to the owner and recipients.
///
/// GET /api/v1/alerts/:alert_id
pub async fn get_alert(
    State(state): State<AppState>,
    caller: Caller,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<AlertDetailResponse>, ApiError> {
    let (alert, recipients) = state.engine.get_alert(alert_id, caller.id()).await?;
    Ok(Json(AlertDetailResponse {
        alert: alert.into(),
        recipients,
    }))
}

/// Cancel an alert. Owner only; cancelling a finished alert returns it
/// unchanged.
///
/// POST /api/v1/alerts/:alert_id/cancel
pub async fn cancel_alert(
    State(state): State<AppState>,
    caller: Caller,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<AlertResponse>, ApiError> {
    let alert = state.engine.cancel_alert(alert_id, caller.id()).await?;
    Ok(Json(alert.into()))
}

/// Confirm arrival manually. Owner only.
///
/// POST /api/v1/alerts/:alert_id/arrival
pub async fn confirm_arrival(
    State(state): State<AppState>,
    caller: Caller,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<AlertResponse>, ApiError> {
    let alert = state.engine.confirm_arrival(alert_id, caller.id()).await?;
    Ok(Json(alert.into()))
}
