//! Arrival request entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{ArrivalRequest, RequestStatus};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for arrival request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "arrival_request_status", rename_all = "lowercase")]
pub enum RequestStatusDb {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl From<RequestStatus> for RequestStatusDb {
    fn from(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Pending => RequestStatusDb::Pending,
            RequestStatus::Accepted => RequestStatusDb::Accepted,
            RequestStatus::Rejected => RequestStatusDb::Rejected,
            RequestStatus::Expired => RequestStatusDb::Expired,
        }
    }
}

impl From<RequestStatusDb> for RequestStatus {
    fn from(status: RequestStatusDb) -> Self {
        match status {
            RequestStatusDb::Pending => RequestStatus::Pending,
            RequestStatusDb::Accepted => RequestStatus::Accepted,
            RequestStatusDb::Rejected => RequestStatus::Rejected,
            RequestStatusDb::Expired => RequestStatus::Expired,
        }
    }
}

/// Database row mapping for the arrival_requests table.
#[derive(Debug, Clone, FromRow)]
pub struct RequestEntity {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub destination_name: Option<String>,
    pub destination_latitude: Option<f64>,
    pub destination_longitude: Option<f64>,
    pub message: Option<String>,
    pub status: RequestStatusDb,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_alert_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<RequestEntity> for ArrivalRequest {
    fn from(entity: RequestEntity) -> Self {
        ArrivalRequest {
            id: entity.id,
            from_user_id: entity.from_user_id,
            to_user_id: entity.to_user_id,
            destination_name: entity.destination_name,
            destination_latitude: entity.destination_latitude,
            destination_longitude: entity.destination_longitude,
            message: entity.message,
            status: entity.status.into(),
            expires_at: entity.expires_at,
            responded_at: entity.responded_at,
            created_alert_id: entity.created_alert_id,
            created_at: entity.created_at,
        }
    }
}
