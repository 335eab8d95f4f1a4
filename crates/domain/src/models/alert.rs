//! Alert domain model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::geodesy::Coordinates;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::alert_recipient::AlertRecipient;
use super::position::Position;

/// Default geofence radius in meters.
pub const DEFAULT_RADIUS_METERS: i32 = 100;
/// Smallest accepted geofence radius in meters.
pub const MIN_RADIUS_METERS: i32 = 50;
/// Largest accepted geofence radius in meters.
pub const MAX_RADIUS_METERS: i32 = 500;
/// Longest accepted fallback window (24 hours).
pub const MAX_FALLBACK_MINUTES: i32 = 1440;
/// Maximum number of recipients per alert.
pub const MAX_RECIPIENTS: usize = 20;

/// Lifecycle status of an alert. Every status other than `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Completed,
    FallbackTriggered,
    Cancelled,
}

impl AlertStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AlertStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Completed => "completed",
            AlertStatus::FallbackTriggered => "fallback_triggered",
            AlertStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "completed" => Ok(AlertStatus::Completed),
            "fallback_triggered" => Ok(AlertStatus::FallbackTriggered),
            "cancelled" => Ok(AlertStatus::Cancelled),
            other => Err(format!("Unknown alert status: {}", other)),
        }
    }
}

/// Where the tracked user is heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: i32,
}

impl Destination {
    pub fn center(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Whether `position` lies inside the detection radius.
    pub fn contains(&self, position: &Position) -> bool {
        position
            .coordinates()
            .is_within(&self.center(), f64::from(self.radius_meters))
    }
}

/// One "notify on arrival" commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub destination: Destination,
    pub fallback_minutes: i32,
    pub fallback_at: DateTime<Utc>,
    pub status: AlertStatus,
    pub triggered_at: Option<DateTime<Utc>>,
    pub last_known: Option<Position>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// Active and past its persisted fallback deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.fallback_at < now
    }
}

/// Everything needed to insert an alert together with its recipients.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub owner_id: Uuid,
    pub destination: Destination,
    pub fallback_minutes: i32,
    pub recipient_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl NewAlert {
    /// Absolute fallback deadline: `created_at + fallback_minutes`.
    pub fn fallback_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::minutes(i64::from(self.fallback_minutes))
    }
}

/// Request payload for creating an alert.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlertRequest {
    #[validate(
        length(min = 1, max = 200, message = "Destination name must be 1-200 characters"),
        custom(function = "shared::validation::validate_not_blank")
    )]
    pub destination_name: String,

    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: f64,

    #[validate(range(
        min = 50,
        max = 500,
        message = "Radius must be between 50 and 500 meters"
    ))]
    pub radius_meters: Option<i32>,

    #[validate(range(
        min = 1,
        max = 1440,
        message = "Fallback must be between 1 minute and 24 hours"
    ))]
    pub fallback_minutes: i32,

    #[validate(length(min = 1, max = 20, message = "An alert needs 1-20 recipients"))]
    pub recipient_ids: Vec<Uuid>,
}

impl CreateAlertRequest {
    /// Builds the insertable alert, applying the default radius and
    /// removing duplicate recipients.
    pub fn into_new_alert(
        self,
        owner_id: Uuid,
        default_radius_meters: i32,
        created_at: DateTime<Utc>,
    ) -> NewAlert {
        let mut recipient_ids = Vec::with_capacity(self.recipient_ids.len());
        for id in self.recipient_ids {
            if !recipient_ids.contains(&id) {
                recipient_ids.push(id);
            }
        }

        NewAlert {
            owner_id,
            destination: Destination {
                name: self.destination_name.trim().to_string(),
                latitude: self.latitude,
                longitude: self.longitude,
                radius_meters: self.radius_meters.unwrap_or(default_radius_meters),
            },
            fallback_minutes: self.fallback_minutes,
            recipient_ids,
            created_at,
        }
    }
}

/// Response payload for alert operations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub destination: Destination,
    pub fallback_minutes: i32,
    pub fallback_at: DateTime<Utc>,
    pub status: AlertStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_known: Option<Position>,
    pub created_at: DateTime<Utc>,
}

impl From<Alert> for AlertResponse {
    fn from(a: Alert) -> Self {
        Self {
            id: a.id,
            owner_id: a.owner_id,
            destination: a.destination,
            fallback_minutes: a.fallback_minutes,
            fallback_at: a.fallback_at,
            status: a.status,
            triggered_at: a.triggered_at,
            last_known: a.last_known,
            created_at: a.created_at,
        }
    }
}

/// Alert together with its recipient rows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDetailResponse {
    #[serde(flatten)]
    pub alert: AlertResponse,
    pub recipients: Vec<AlertRecipient>,
}

/// Response for listing alerts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAlertsResponse {
    pub alerts: Vec<AlertResponse>,
    pub total: usize,
}

/// Query parameters for alert history.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertHistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    20
}
