//! Arrival request endpoint handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::{
    ArrivalRequest, ListRequestsResponse, RespondRequestPayload, RespondRequestResponse,
    SendRequestPayload,
};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Caller;

/// Ask another user to confirm their arrival.
///
/// POST /api/v1/requests
pub async fn send_request(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<SendRequestPayload>,
) -> Result<(StatusCode, Json<ArrivalRequest>), ApiError> {
    payload.validate()?;
    let request = state.requests.send_request(caller.id(), payload).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Pending requests addressed to the caller.
///
/// GET /api/v1/requests/pending
pub async fn list_pending(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ListRequestsResponse>, ApiError> {
    let requests = state.requests.pending_for(caller.id()).await?;
    let total = requests.len();
    Ok(Json(ListRequestsResponse { requests, total }))
}

/// Requests the caller has sent.
///
/// GET /api/v1/requests/sent
pub async fn list_sent(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ListRequestsResponse>, ApiError> {
    let requests = state.requests.sent_by(caller.id()).await?;
    let total = requests.len();
    Ok(Json(ListRequestsResponse { requests, total }))
}

/// Accept or reject a pending request. Accepting starts an alert owned by
/// the caller.
///
/// POST /api/v1/requests/:request_id/respond
pub async fn respond_to_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<RespondRequestPayload>,
) -> Result<Json<RespondRequestResponse>, ApiError> {
    let (request, alert) = state
        .requests
        .respond(request_id, caller.id(), payload.action)
        .await?;

    Ok(Json(RespondRequestResponse {
        request,
        alert: alert.map(Into::into),
    }))
}
