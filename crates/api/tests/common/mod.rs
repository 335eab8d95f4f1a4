//! Common test utilities for integration tests.
//!
//! Tests run the full router over the in-memory store and the mock push
//! sender, so no database or network is needed.

// Not every helper is used by every test binary.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use arrival_guard_api::{
    app::{create_app, AppState, Backends},
    config::Config,
    extractors::USER_ID_HEADER,
};
use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use domain::models::{LocationPermission, Profile};
use domain::services::{InMemoryStore, MockPushSender};
use fake::faker::internet::en::Username;
use fake::faker::name::en::Name;
use fake::Fake;
use tower::ServiceExt;
use uuid::Uuid;

/// Test configuration on the mock push provider.
pub fn test_config() -> Config {
    Config::load_for_test(&[]).expect("Failed to load test config")
}

/// A running application with handles on its in-memory collaborators.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub push: Arc<MockPushSender>,
}

impl TestApp {
    /// Must be called inside a Tokio runtime; the engine loop is spawned.
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let push = Arc::new(MockPushSender::new());
        let state = AppState::new(
            test_config(),
            Backends::in_memory(store.clone(), push.clone()),
        );
        Self { state, store, push }
    }

    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }

    /// Registers a profile with a fake name and a push address.
    pub fn create_user(&self) -> TestUser {
        let user = TestUser::new();
        self.store.upsert_profile(Profile {
            id: user.id,
            username: user.username.clone(),
            full_name: Some(user.full_name.clone()),
            push_token: Some(user.push_token.clone()),
        });
        user
    }

    /// Registers a profile and grants it background location access.
    pub fn create_tracked_user(&self) -> TestUser {
        let user = self.create_user();
        self.grant_permission(user.id);
        user
    }

    pub fn grant_permission(&self, user_id: Uuid) {
        self.state
            .locations
            .set_permission(user_id, LocationPermission::Granted);
    }

    /// Sends one request through a fresh router.
    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router().oneshot(request).await.unwrap()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Test user data.
pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub push_token: String,
}

impl TestUser {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        let username: String = Username().fake();
        Self {
            id,
            username: format!("{}_{}", username, id.simple()),
            full_name: Name().fake(),
            push_token: format!("ExponentPushToken[{}]", id.simple()),
        }
    }
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a JSON request acting as `user_id`.
pub fn json_request_as(
    method: Method,
    uri: &str,
    body: serde_json::Value,
    user_id: Uuid,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(USER_ID_HEADER, user_id.to_string())
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a GET request acting as `user_id`.
pub fn get_request_as(uri: &str, user_id: Uuid) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(USER_ID_HEADER, user_id.to_string())
        .body(Body::empty())
        .unwrap()
}

/// Build a body-less POST request acting as `user_id`.
pub fn post_request_as(uri: &str, user_id: Uuid) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(USER_ID_HEADER, user_id.to_string())
        .body(Body::empty())
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}

/// Alert payload towards a point in Lisbon.
pub fn alert_body(recipients: &[Uuid]) -> serde_json::Value {
    serde_json::json!({
        "destinationName": "Home",
        "latitude": 38.7223,
        "longitude": -9.1393,
        "radiusMeters": 100,
        "fallbackMinutes": 30,
        "recipientIds": recipients,
    })
}

/// Polls the alert detail until its status is `status`. Engine transitions
/// from positions are asynchronous.
pub async fn wait_for_status(app: &TestApp, alert_id: &str, owner: Uuid, status: &str) -> bool {
    for _ in 0..50 {
        let response = app
            .send(get_request_as(&format!("/api/v1/alerts/{}", alert_id), owner))
            .await;
        let body = parse_response_body(response).await;
        if body["status"] == status {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
