//! Alert and alert recipient entities (database row mappings).

use chrono::{DateTime, Utc};
use domain::models::{Alert, AlertRecipient, AlertStatus, Destination, Position};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for alert status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "alert_status", rename_all = "snake_case")]
pub enum AlertStatusDb {
    Active,
    Completed,
    FallbackTriggered,
    Cancelled,
}

impl From<AlertStatus> for AlertStatusDb {
    fn from(status: AlertStatus) -> Self {
        match status {
            AlertStatus::Active => AlertStatusDb::Active,
            AlertStatus::Completed => AlertStatusDb::Completed,
            AlertStatus::FallbackTriggered => AlertStatusDb::FallbackTriggered,
            AlertStatus::Cancelled => AlertStatusDb::Cancelled,
        }
    }
}

impl From<AlertStatusDb> for AlertStatus {
    fn from(status: AlertStatusDb) -> Self {
        match status {
            AlertStatusDb::Active => AlertStatus::Active,
            AlertStatusDb::Completed => AlertStatus::Completed,
            AlertStatusDb::FallbackTriggered => AlertStatus::FallbackTriggered,
            AlertStatusDb::Cancelled => AlertStatus::Cancelled,
        }
    }
}

/// Database row mapping for the alerts table.
///
/// The last known position is stored as three nullable columns that are
/// written together.
#[derive(Debug, Clone, FromRow)]
pub struct AlertEntity {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub destination_name: String,
    pub destination_latitude: f64,
    pub destination_longitude: f64,
    pub radius_meters: i32,
    pub fallback_minutes: i32,
    pub fallback_at: DateTime<Utc>,
    pub status: AlertStatusDb,
    pub triggered_at: Option<DateTime<Utc>>,
    pub last_known_latitude: Option<f64>,
    pub last_known_longitude: Option<f64>,
    pub last_known_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AlertEntity {
    /// Convert to domain model.
    pub fn into_domain(self) -> Alert {
        let last_known = match (
            self.last_known_latitude,
            self.last_known_longitude,
            self.last_known_at,
        ) {
            (Some(latitude), Some(longitude), Some(recorded_at)) => {
                Some(Position::new(latitude, longitude, recorded_at))
            }
            _ => None,
        };

        Alert {
            id: self.id,
            owner_id: self.owner_id,
            destination: Destination {
                name: self.destination_name,
                latitude: self.destination_latitude,
                longitude: self.destination_longitude,
                radius_meters: self.radius_meters,
            },
            fallback_minutes: self.fallback_minutes,
            fallback_at: self.fallback_at,
            status: self.status.into(),
            triggered_at: self.triggered_at,
            last_known,
            created_at: self.created_at,
        }
    }
}

impl From<AlertEntity> for Alert {
    fn from(entity: AlertEntity) -> Self {
        entity.into_domain()
    }
}

/// Database row mapping for the alert_recipients table.
#[derive(Debug, Clone, FromRow)]
pub struct AlertRecipientEntity {
    pub alert_id: Uuid,
    pub recipient_id: Uuid,
    pub notified_at: Option<DateTime<Utc>>,
}

impl From<AlertRecipientEntity> for AlertRecipient {
    fn from(entity: AlertRecipientEntity) -> Self {
        AlertRecipient {
            alert_id: entity.alert_id,
            recipient_id: entity.recipient_id,
            notified_at: entity.notified_at,
        }
    }
}
