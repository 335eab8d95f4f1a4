//! Shared fixtures for engine scenario tests.
//!
//! Everything runs against the in-memory store, the mock push sender and a
//! device-fed location provider; no database is required.

#![allow(dead_code)]

use domain::models::{
    AlertStatus, CreateAlertRequest, LocationPermission, Profile, SendRequestPayload,
};
use domain::services::{
    AlertEngine, AlertStore, DeviceLocationProvider, EngineSettings, InMemoryStore,
    MockPushSender, RequestService, RequestSettings,
};
use fake::faker::address::en::CityName;
use fake::faker::internet::en::Username;
use fake::Fake;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Destination centre used by every fixture alert.
pub const HOME_LAT: f64 = 40.4168;
pub const HOME_LNG: f64 = -3.7038;

pub struct TestWorld {
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<DeviceLocationProvider>,
    pub sender: Arc<MockPushSender>,
    pub engine: Arc<AlertEngine>,
    pub requests: RequestService,
}

impl TestWorld {
    pub fn new() -> Self {
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
        let requests = RequestService::new(
            store.clone(),
            store.clone(),
            provider.clone(),
            engine.clone(),
            RequestSettings::default(),
        );

        Self {
            store,
            provider,
            sender,
            engine,
            requests,
        }
    }

    /// Registers a user with a push address and returns its id.
    pub fn user(&self) -> Uuid {
        let id = Uuid::new_v4();
        let username: String = Username().fake();
        self.store.upsert_profile(Profile {
            id,
            username,
            full_name: None,
            push_token: Some(push_address(id)),
        });
        id
    }

    /// Registers a user with background location granted.
    pub fn traveller(&self) -> Uuid {
        let id = self.user();
        self.provider.set_permission(id, LocationPermission::Granted);
        id
    }

    pub async fn wait_for_status(&self, alert_id: Uuid, status: AlertStatus) {
        for _ in 0..200 {
            let alert = self
                .store
                .find_alert(alert_id)
                .await
                .expect("store error")
                .expect("alert missing");
            if alert.status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("alert {} never reached {}", alert_id, status);
    }

    /// Lets spawned tasks drain their queues.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub fn push_address(user_id: Uuid) -> String {
    format!("ExponentPushToken[{}]", user_id.simple())
}

pub fn alert_request(recipients: Vec<Uuid>, fallback_minutes: i32) -> CreateAlertRequest {
    CreateAlertRequest {
        destination_name: CityName().fake(),
        latitude: HOME_LAT,
        longitude: HOME_LNG,
        radius_meters: Some(100),
        fallback_minutes,
        recipient_ids: recipients,
    }
}

pub fn plain_request(to_user_id: Uuid) -> SendRequestPayload {
    SendRequestPayload {
        to_user_id,
        destination_name: None,
        destination_latitude: None,
        destination_longitude: None,
        message: None,
    }
}
