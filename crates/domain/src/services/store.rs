//! Storage collaborator traits used by the alert engine.
//!
//! Every lifecycle change goes through a conditional write that only applies
//! while the row is still in its expected state. Implementations must express
//! these as a single atomic check-and-set, never a read followed by a write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    Alert, AlertRecipient, AlertStatus, ArrivalRequest, NewAlert, NewArrivalRequest, Position,
    Profile, RequestStatus,
};

/// Result of a conditional status transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The write committed; carries the updated alert.
    Applied(Alert),
    /// Zero rows matched. `current` is the status found afterwards, if the
    /// alert exists at all.
    Lost { current: Option<AlertStatus> },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Inserts an alert and its recipient rows in one unit. Fails with
    /// `InvalidState` when the owner already has an active alert.
    async fn insert_alert(&self, new_alert: NewAlert) -> Result<Alert, EngineError>;

    async fn find_alert(&self, id: Uuid) -> Result<Option<Alert>, EngineError>;

    async fn find_active_for_owner(&self, owner_id: Uuid) -> Result<Option<Alert>, EngineError>;

    /// Non-active alerts of the owner, newest first.
    async fn list_history(&self, owner_id: Uuid, limit: i64) -> Result<Vec<Alert>, EngineError>;

    async fn list_recipients(&self, alert_id: Uuid) -> Result<Vec<AlertRecipient>, EngineError>;

    async fn list_active(&self) -> Result<Vec<Alert>, EngineError>;

    /// Sets `status = to` (and `triggered_at` when given) only if the alert
    /// is still active.
    async fn transition_if_active(
        &self,
        id: Uuid,
        to: AlertStatus,
        triggered_at: Option<DateTime<Utc>>,
    ) -> Result<TransitionOutcome, EngineError>;

    /// Writes the last known position only if the alert is still active.
    /// Returns whether a row was updated.
    async fn record_position_if_active(
        &self,
        id: Uuid,
        position: &Position,
    ) -> Result<bool, EngineError>;

    /// Active alerts whose `fallback_at` lies before `now`, oldest deadline first.
    async fn find_overdue(&self, now: DateTime<Utc>, limit: i64)
        -> Result<Vec<Alert>, EngineError>;

    /// Stamps `notified_at` if it is still unset. Returns whether it was stamped.
    async fn mark_recipient_notified(
        &self,
        alert_id: Uuid,
        recipient_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert_request(
        &self,
        new_request: NewArrivalRequest,
    ) -> Result<ArrivalRequest, EngineError>;

    async fn find_request(&self, id: Uuid) -> Result<Option<ArrivalRequest>, EngineError>;

    /// Moves a pending request to `status`, stamping `responded_at`.
    /// Returns `None` when the request was no longer pending.
    async fn respond_if_pending(
        &self,
        id: Uuid,
        status: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<ArrivalRequest>, EngineError>;

    /// In one transaction: flips the pending request to accepted, inserts the
    /// alert with its recipients and links `created_alert_id`. Returns `None`
    /// when the request was no longer pending, in which case nothing is written.
    async fn accept_request(
        &self,
        request_id: Uuid,
        new_alert: NewAlert,
        at: DateTime<Utc>,
    ) -> Result<Option<(ArrivalRequest, Alert)>, EngineError>;

    /// Expires every pending request past its deadline. Returns the count.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, EngineError>;

    /// Pending requests addressed to the user, newest first.
    async fn list_pending_for(&self, user_id: Uuid) -> Result<Vec<ArrivalRequest>, EngineError>;

    /// Requests sent by the user, newest first.
    async fn list_sent_by(&self, user_id: Uuid) -> Result<Vec<ArrivalRequest>, EngineError>;
}

/// Identity and push address lookup.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>, EngineError>;

    async fn find_profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>, EngineError>;
}
