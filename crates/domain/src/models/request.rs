//! Arrival request domain model.
//!
//! A request is a directed ask from one user to another: "let me know when
//! you arrive". Accepting it spawns an alert owned by the responder whose
//! only recipient is the requester.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::alert::{AlertResponse, Destination};

/// Destination name used when an accepted request carried none.
pub const DEFAULT_REQUESTED_DESTINATION_NAME: &str = "Requested destination";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "rejected" => Ok(RequestStatus::Rejected),
            "expired" => Ok(RequestStatus::Expired),
            other => Err(format!("Unknown request status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalRequest {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub destination_name: Option<String>,
    pub destination_latitude: Option<f64>,
    pub destination_longitude: Option<f64>,
    pub message: Option<String>,
    pub status: RequestStatus,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_alert_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ArrivalRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Destination for the alert spawned on acceptance. Missing parts fall
    /// back to a generic name and the (0, 0) coordinate.
    pub fn alert_destination(&self, radius_meters: i32) -> Destination {
        Destination {
            name: self
                .destination_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_REQUESTED_DESTINATION_NAME)
                .to_string(),
            latitude: self.destination_latitude.unwrap_or(0.0),
            longitude: self.destination_longitude.unwrap_or(0.0),
            radius_meters,
        }
    }
}

/// Everything needed to insert a request.
#[derive(Debug, Clone)]
pub struct NewArrivalRequest {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub destination_name: Option<String>,
    pub destination_latitude: Option<f64>,
    pub destination_longitude: Option<f64>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Request payload for sending an arrival request.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendRequestPayload {
    pub to_user_id: Uuid,

    #[validate(length(max = 200, message = "Destination name must be at most 200 characters"))]
    pub destination_name: Option<String>,

    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub destination_latitude: Option<f64>,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub destination_longitude: Option<f64>,

    #[validate(length(max = 500, message = "Message must be at most 500 characters"))]
    pub message: Option<String>,
}

impl SendRequestPayload {
    /// Coordinates must be given together or not at all.
    pub fn has_consistent_coordinates(&self) -> bool {
        self.destination_latitude.is_some() == self.destination_longitude.is_some()
    }
}

/// Responder's decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RespondAction {
    Accept,
    Reject,
}

/// Request payload for responding to a request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequestPayload {
    pub action: RespondAction,
}

/// Response payload for a request response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequestResponse {
    pub request: ArrivalRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertResponse>,
}

/// Response for listing requests.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequestsResponse {
    pub requests: Vec<ArrivalRequest>,
    pub total: usize,
}
