//! In-process store implementing every storage trait.
//!
//! Used by the engine tests and by local runs without a database. A single
//! mutex guards all tables, so each conditional write is atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::store::{AlertStore, ProfileDirectory, RequestStore, TransitionOutcome};
use crate::error::EngineError;
use crate::models::{
    Alert, AlertRecipient, AlertStatus, ArrivalRequest, NewAlert, NewArrivalRequest, Position,
    Profile, RequestStatus,
};

#[derive(Debug, Default)]
struct Tables {
    alerts: HashMap<Uuid, Alert>,
    recipients: Vec<AlertRecipient>,
    requests: HashMap<Uuid, ArrivalRequest>,
    profiles: HashMap<Uuid, Profile>,
}

impl Tables {
    fn insert_alert(&mut self, new_alert: NewAlert) -> Result<Alert, EngineError> {
        let owner_busy = self
            .alerts
            .values()
            .any(|a| a.owner_id == new_alert.owner_id && a.is_active());
        if owner_busy {
            return Err(EngineError::InvalidState(
                "Owner already has an active alert".to_string(),
            ));
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            owner_id: new_alert.owner_id,
            fallback_at: new_alert.fallback_at(),
            destination: new_alert.destination,
            fallback_minutes: new_alert.fallback_minutes,
            status: AlertStatus::Active,
            triggered_at: None,
            last_known: None,
            created_at: new_alert.created_at,
        };
        for recipient_id in new_alert.recipient_ids {
            self.recipients
                .push(AlertRecipient::pending(alert.id, recipient_id));
        }
        self.alerts.insert(alert.id, alert.clone());
        Ok(alert)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a profile.
    pub fn upsert_profile(&self, profile: Profile) {
        self.lock().profiles.insert(profile.id, profile);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn newest_first<T>(items: &mut [T], created_at: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
}

#[async_trait]
impl AlertStore for InMemoryStore {
    async fn insert_alert(&self, new_alert: NewAlert) -> Result<Alert, EngineError> {
        self.lock().insert_alert(new_alert)
    }

    async fn find_alert(&self, id: Uuid) -> Result<Option<Alert>, EngineError> {
        Ok(self.lock().alerts.get(&id).cloned())
    }

    async fn find_active_for_owner(&self, owner_id: Uuid) -> Result<Option<Alert>, EngineError> {
        Ok(self
            .lock()
            .alerts
            .values()
            .find(|a| a.owner_id == owner_id && a.is_active())
            .cloned())
    }

    async fn list_history(&self, owner_id: Uuid, limit: i64) -> Result<Vec<Alert>, EngineError> {
        let mut alerts: Vec<Alert> = self
            .lock()
            .alerts
            .values()
            .filter(|a| a.owner_id == owner_id && !a.is_active())
            .cloned()
            .collect();
        newest_first(&mut alerts, |a| a.created_at);
        alerts.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(alerts)
    }

    async fn list_recipients(&self, alert_id: Uuid) -> Result<Vec<AlertRecipient>, EngineError> {
        Ok(self
            .lock()
            .recipients
            .iter()
            .filter(|r| r.alert_id == alert_id)
            .cloned()
            .collect())
    }

    async fn list_active(&self) -> Result<Vec<Alert>, EngineError> {
        Ok(self
            .lock()
            .alerts
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect())
    }

    async fn transition_if_active(
        &self,
        id: Uuid,
        to: AlertStatus,
        triggered_at: Option<DateTime<Utc>>,
    ) -> Result<TransitionOutcome, EngineError> {
        let mut tables = self.lock();
        match tables.alerts.get_mut(&id) {
            Some(alert) if alert.is_active() => {
                alert.status = to;
                alert.triggered_at = triggered_at;
                Ok(TransitionOutcome::Applied(alert.clone()))
            }
            Some(alert) => Ok(TransitionOutcome::Lost {
                current: Some(alert.status),
            }),
            None => Ok(TransitionOutcome::Lost { current: None }),
        }
    }

    async fn record_position_if_active(
        &self,
        id: Uuid,
        position: &Position,
    ) -> Result<bool, EngineError> {
        let mut tables = self.lock();
        match tables.alerts.get_mut(&id) {
            Some(alert) if alert.is_active() => {
                alert.last_known = Some(*position);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_overdue(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Alert>, EngineError> {
        let mut alerts: Vec<Alert> = self
            .lock()
            .alerts
            .values()
            .filter(|a| a.is_overdue(now))
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.fallback_at);
        alerts.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(alerts)
    }

    async fn mark_recipient_notified(
        &self,
        alert_id: Uuid,
        recipient_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let mut tables = self.lock();
        let row = tables.recipients.iter_mut().find(|r| {
            r.alert_id == alert_id && r.recipient_id == recipient_id && r.notified_at.is_none()
        });
        Ok(match row {
            Some(row) => {
                row.notified_at = Some(at);
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl RequestStore for InMemoryStore {
    async fn insert_request(
        &self,
        new_request: NewArrivalRequest,
    ) -> Result<ArrivalRequest, EngineError> {
        let request = ArrivalRequest {
            id: Uuid::new_v4(),
            from_user_id: new_request.from_user_id,
            to_user_id: new_request.to_user_id,
            destination_name: new_request.destination_name,
            destination_latitude: new_request.destination_latitude,
            destination_longitude: new_request.destination_longitude,
            message: new_request.message,
            status: RequestStatus::Pending,
            expires_at: new_request.expires_at,
            responded_at: None,
            created_alert_id: None,
            created_at: new_request.created_at,
        };
        self.lock().requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_request(&self, id: Uuid) -> Result<Option<ArrivalRequest>, EngineError> {
        Ok(self.lock().requests.get(&id).cloned())
    }

    async fn respond_if_pending(
        &self,
        id: Uuid,
        status: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<ArrivalRequest>, EngineError> {
        let mut tables = self.lock();
        match tables.requests.get_mut(&id) {
            Some(request) if request.is_pending() => {
                request.status = status;
                request.responded_at = Some(at);
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn accept_request(
        &self,
        request_id: Uuid,
        new_alert: NewAlert,
        at: DateTime<Utc>,
    ) -> Result<Option<(ArrivalRequest, Alert)>, EngineError> {
        let mut tables = self.lock();
        let pending = tables
            .requests
            .get(&request_id)
            .map(ArrivalRequest::is_pending)
            .unwrap_or(false);
        if !pending {
            return Ok(None);
        }

        // Alert first: a failed insert leaves the request untouched.
        let alert = tables.insert_alert(new_alert)?;
        let request = match tables.requests.get_mut(&request_id) {
            Some(request) => request,
            None => return Ok(None),
        };
        request.status = RequestStatus::Accepted;
        request.responded_at = Some(at);
        request.created_alert_id = Some(alert.id);
        Ok(Some((request.clone(), alert)))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, EngineError> {
        let mut tables = self.lock();
        let mut expired = 0;
        for request in tables.requests.values_mut() {
            if request.is_pending() && request.expires_at < now {
                request.status = RequestStatus::Expired;
                request.responded_at = Some(now);
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn list_pending_for(&self, user_id: Uuid) -> Result<Vec<ArrivalRequest>, EngineError> {
        let mut requests: Vec<ArrivalRequest> = self
            .lock()
            .requests
            .values()
            .filter(|r| r.to_user_id == user_id && r.is_pending())
            .cloned()
            .collect();
        newest_first(&mut requests, |r| r.created_at);
        Ok(requests)
    }

    async fn list_sent_by(&self, user_id: Uuid) -> Result<Vec<ArrivalRequest>, EngineError> {
        let mut requests: Vec<ArrivalRequest> = self
            .lock()
            .requests
            .values()
            .filter(|r| r.from_user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut requests, |r| r.created_at);
        Ok(requests)
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryStore {
    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>, EngineError> {
        Ok(self.lock().profiles.get(&id).cloned())
    }

    async fn find_profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>, EngineError> {
        let tables = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| tables.profiles.get(id).cloned())
            .collect())
    }
}
