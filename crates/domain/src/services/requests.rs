//! Arrival requests and their conversion into alerts.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::dispatcher::NotificationKind;
use super::engine::AlertEngine;
use super::location_provider::LocationProvider;
use super::store::{ProfileDirectory, RequestStore};
use crate::error::EngineError;
use crate::models::{
    Alert, ArrivalRequest, NewAlert, NewArrivalRequest, RequestStatus, RespondAction,
    SendRequestPayload,
};

/// Tunables for request handling.
#[derive(Debug, Clone)]
pub struct RequestSettings {
    /// Fallback window applied to alerts created from accepted requests.
    pub accept_fallback_minutes: i32,
    /// How long a request stays answerable.
    pub expiry: Duration,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            accept_fallback_minutes: 60,
            expiry: Duration::hours(24),
        }
    }
}

pub struct RequestService {
    requests: Arc<dyn RequestStore>,
    profiles: Arc<dyn ProfileDirectory>,
    provider: Arc<dyn LocationProvider>,
    engine: Arc<AlertEngine>,
    settings: RequestSettings,
}

impl RequestService {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        profiles: Arc<dyn ProfileDirectory>,
        provider: Arc<dyn LocationProvider>,
        engine: Arc<AlertEngine>,
        settings: RequestSettings,
    ) -> Self {
        Self {
            requests,
            profiles,
            provider,
            engine,
            settings,
        }
    }

    /// Sends a request from `from_user_id` and notifies the addressee.
    pub async fn send_request(
        &self,
        from_user_id: Uuid,
        payload: SendRequestPayload,
    ) -> Result<ArrivalRequest, EngineError> {
        payload.validate()?;
        if !payload.has_consistent_coordinates() {
            return Err(EngineError::Validation(
                "Destination latitude and longitude must be given together".to_string(),
            ));
        }
        if payload.to_user_id == from_user_id {
            return Err(EngineError::Validation(
                "Cannot send a request to yourself".to_string(),
            ));
        }
        if self.profiles.find_profile(payload.to_user_id).await?.is_none() {
            return Err(EngineError::NotFound("User not found".to_string()));
        }

        let now = Utc::now();
        let request = self
            .requests
            .insert_request(NewArrivalRequest {
                from_user_id,
                to_user_id: payload.to_user_id,
                destination_name: payload
                    .destination_name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty()),
                destination_latitude: payload.destination_latitude,
                destination_longitude: payload.destination_longitude,
                message: payload
                    .message
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty()),
                created_at: now,
                expires_at: now + self.settings.expiry,
            })
            .await?;

        counter!("arrival_requests_total", "action" => "sent").increment(1);
        tracing::info!(
            request_id = %request.id,
            from_user_id = %from_user_id,
            to_user_id = %request.to_user_id,
            "Arrival request sent"
        );

        self.engine
            .dispatcher()
            .notify_new_request(&request)
            .await;
        Ok(request)
    }

    /// Accepts or rejects. Returns the alert created on acceptance.
    pub async fn respond(
        &self,
        request_id: Uuid,
        responder_id: Uuid,
        action: RespondAction,
    ) -> Result<(ArrivalRequest, Option<Alert>), EngineError> {
        match action {
            RespondAction::Accept => {
                let (request, alert) = self.accept(request_id, responder_id).await?;
                Ok((request, Some(alert)))
            }
            RespondAction::Reject => {
                let request = self.reject(request_id, responder_id).await?;
                Ok((request, None))
            }
        }
    }

    /// Flips the request to accepted and creates the responder's alert with
    /// the requester as sole recipient, in one storage transaction.
    pub async fn accept(
        &self,
        request_id: Uuid,
        responder_id: Uuid,
    ) -> Result<(ArrivalRequest, Alert), EngineError> {
        let now = Utc::now();
        let request = self.answerable(request_id, responder_id, now).await?;

        if !self
            .provider
            .background_permission(responder_id)
            .await
            .is_granted()
        {
            return Err(EngineError::PermissionDenied);
        }

        let new_alert = NewAlert {
            owner_id: responder_id,
            destination: request.alert_destination(self.engine.settings().default_radius_meters),
            fallback_minutes: self.settings.accept_fallback_minutes,
            recipient_ids: vec![request.from_user_id],
            created_at: now,
        };
        let (request, alert) = self
            .requests
            .accept_request(request_id, new_alert, now)
            .await?
            .ok_or_else(already_answered)?;

        counter!("alerts_created_total", "source" => "request").increment(1);
        counter!("arrival_requests_total", "action" => "accepted").increment(1);
        tracing::info!(
            request_id = %request.id,
            alert_id = %alert.id,
            responder_id = %responder_id,
            "Arrival request accepted"
        );

        self.engine.start_tracking(&alert).await?;

        self.engine
            .dispatcher()
            .notify(
                NotificationKind::RequestAccepted {
                    request_id: request.id,
                },
                &alert,
                &[request.from_user_id],
            )
            .await;
        Ok((request, alert))
    }

    /// Flips the request to rejected. No alert, no notification.
    pub async fn reject(
        &self,
        request_id: Uuid,
        responder_id: Uuid,
    ) -> Result<ArrivalRequest, EngineError> {
        let now = Utc::now();
        self.answerable(request_id, responder_id, now).await?;

        let request = self
            .requests
            .respond_if_pending(request_id, RequestStatus::Rejected, now)
            .await?
            .ok_or_else(already_answered)?;

        counter!("arrival_requests_total", "action" => "rejected").increment(1);
        tracing::info!(request_id = %request.id, responder_id = %responder_id, "Arrival request rejected");
        Ok(request)
    }

    /// Loads the request and checks that `responder_id` may answer it now.
    /// An expired pending request is flipped to expired on the way.
    async fn answerable(
        &self,
        request_id: Uuid,
        responder_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ArrivalRequest, EngineError> {
        let request = self
            .requests
            .find_request(request_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Request not found".to_string()))?;

        if request.to_user_id != responder_id {
            return Err(EngineError::Unauthorized(
                "Only the addressee can respond to this request".to_string(),
            ));
        }
        if !request.is_pending() {
            return Err(already_answered());
        }
        if request.is_expired_at(now) {
            self.requests
                .respond_if_pending(request_id, RequestStatus::Expired, now)
                .await?;
            return Err(EngineError::InvalidState("Request has expired".to_string()));
        }
        Ok(request)
    }

    /// Expires every pending request past its deadline.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, EngineError> {
        let expired = self.requests.expire_overdue(now).await?;
        if expired > 0 {
            counter!("arrival_requests_total", "action" => "expired").increment(expired);
            tracing::info!(expired = expired, "Expired overdue arrival requests");
        }
        Ok(expired)
    }

    pub async fn pending_for(&self, user_id: Uuid) -> Result<Vec<ArrivalRequest>, EngineError> {
        self.requests.list_pending_for(user_id).await
    }

    pub async fn sent_by(&self, user_id: Uuid) -> Result<Vec<ArrivalRequest>, EngineError> {
        self.requests.list_sent_by(user_id).await
    }
}

fn already_answered() -> EngineError {
    EngineError::InvalidState("Request has already been answered".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertStatus, LocationPermission, Profile};
    use crate::services::engine::EngineSettings;
    use crate::services::location_provider::DeviceLocationProvider;
    use crate::services::memory_store::InMemoryStore;
    use crate::services::notification::{MockPushSender, NotificationType};
    use crate::services::store::AlertStore;

    struct Harness {
        store: Arc<InMemoryStore>,
        provider: Arc<DeviceLocationProvider>,
        sender: Arc<MockPushSender>,
        service: RequestService,
        requester: Uuid,
        responder: Uuid,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(DeviceLocationProvider::new());
        let sender = Arc::new(MockPushSender::new());
        let engine = AlertEngine::start(
            store.clone(),
            store.clone(),
            provider.clone(),
            sender.clone(),
            EngineSettings::default(),
        );
        let service = RequestService::new(
            store.clone(),
            store.clone(),
            provider.clone(),
            engine,
            RequestSettings::default(),
        );

        let requester = Uuid::new_v4();
        let responder = Uuid::new_v4();
        for (id, name, token) in [
            (requester, "ana", "ExponentPushToken[ana]"),
            (responder, "bo", "ExponentPushToken[bo]"),
        ] {
            store.upsert_profile(Profile {
                id,
                username: name.to_string(),
                full_name: None,
                push_token: Some(token.to_string()),
            });
        }
        provider.set_permission(responder, LocationPermission::Granted);

        Harness {
            store,
            provider,
            sender,
            service,
            requester,
            responder,
        }
    }

    fn payload(to: Uuid) -> SendRequestPayload {
        SendRequestPayload {
            to_user_id: to,
            destination_name: None,
            destination_latitude: None,
            destination_longitude: None,
            message: Some("text me".to_string()),
        }
    }

    #[tokio::test]
    async fn test_send_request_notifies_addressee() {
        let h = harness();
        let request = h
            .service
            .send_request(h.requester, payload(h.responder))
            .await
            .unwrap();

        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.expires_at - request.created_at, Duration::hours(24));

        let sent = h.sender.sent_of(NotificationType::NewRequest);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "ExponentPushToken[bo]");
        assert!(sent[0].1.body.ends_with(": text me"));
    }

    #[tokio::test]
    async fn test_send_request_rejects_bad_targets() {
        let h = harness();
        assert!(matches!(
            h.service.send_request(h.requester, payload(h.requester)).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            h.service.send_request(h.requester, payload(Uuid::new_v4())).await,
            Err(EngineError::NotFound(_))
        ));

        let mut half = payload(h.responder);
        half.destination_latitude = Some(1.0);
        assert!(matches!(
            h.service.send_request(h.requester, half).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_accept_by_wrong_user_is_unauthorized() {
        let h = harness();
        let request = h
            .service
            .send_request(h.requester, payload(h.responder))
            .await
            .unwrap();

        let result = h.service.accept(request.id, h.requester).await;
        assert!(matches!(result, Err(EngineError::Unauthorized(_))));

        let stored = h.store.find_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
        assert!(h.store.find_active_for_owner(h.requester).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reject_creates_no_alert() {
        let h = harness();
        let request = h
            .service
            .send_request(h.requester, payload(h.responder))
            .await
            .unwrap();

        let (rejected, alert) = h
            .service
            .respond(request.id, h.responder, RespondAction::Reject)
            .await
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert!(rejected.created_alert_id.is_none());
        assert!(alert.is_none());
        assert!(h.store.find_active_for_owner(h.responder).await.unwrap().is_none());

        let again = h.service.accept(request.id, h.responder).await;
        assert!(matches!(again, Err(EngineError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_expired_request_cannot_be_answered() {
        let h = harness();
        let request = h
            .service
            .send_request(h.requester, payload(h.responder))
            .await
            .unwrap();

        let later = request.expires_at + Duration::seconds(1);
        assert_eq!(h.service.expire_overdue(later).await.unwrap(), 1);

        let result = h.service.accept(request.id, h.responder).await;
        assert!(matches!(result, Err(EngineError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_accept_without_permission() {
        let h = harness();
        let request = h
            .service
            .send_request(h.requester, payload(h.responder))
            .await
            .unwrap();
        h.provider
            .set_permission(h.responder, LocationPermission::Denied);

        let result = h.service.accept(request.id, h.responder).await;
        assert_eq!(result, Err(EngineError::PermissionDenied));
        let stored = h.store.find_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_accept_while_travelling_keeps_request_pending() {
        let h = harness();
        let first = h
            .service
            .send_request(h.requester, payload(h.responder))
            .await
            .unwrap();
        let second = h
            .service
            .send_request(h.requester, payload(h.responder))
            .await
            .unwrap();
        h.service.accept(first.id, h.responder).await.unwrap();

        let result = h.service.accept(second.id, h.responder).await;
        assert!(matches!(result, Err(EngineError::InvalidState(_))));
        let stored = h.store.find_request(second.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_accept_uses_requested_destination() {
        let h = harness();
        let mut with_destination = payload(h.responder);
        with_destination.destination_name = Some("Gym".to_string());
        with_destination.destination_latitude = Some(40.0);
        with_destination.destination_longitude = Some(-3.0);
        let request = h
            .service
            .send_request(h.requester, with_destination)
            .await
            .unwrap();

        let (_, alert) = h.service.accept(request.id, h.responder).await.unwrap();
        assert_eq!(alert.destination.name, "Gym");
        assert_eq!(alert.destination.latitude, 40.0);
        assert_eq!(alert.status, AlertStatus::Active);
    }
}
