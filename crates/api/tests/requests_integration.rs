//! Integration tests for arrival request endpoints.
//!
//! Run with: cargo test --test requests_integration

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{get_request_as, json_request_as, parse_response_body, TestApp, TestUser};
use domain::services::NotificationType;
use serde_json::json;

async fn send_request(app: &TestApp, from: &TestUser, to: &TestUser) -> serde_json::Value {
    let response = app
        .send(json_request_as(
            Method::POST,
            "/api/v1/requests",
            json!({
                "toUserId": to.id,
                "destinationName": "Grandma's",
                "destinationLatitude": 41.1579,
                "destinationLongitude": -8.6291,
                "message": "Let me know when you get there",
            }),
            from.id,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    parse_response_body(response).await
}

fn respond_uri(request: &serde_json::Value) -> String {
    format!(
        "/api/v1/requests/{}/respond",
        request["id"].as_str().unwrap()
    )
}

// ============================================================================
// Send Request Tests
// ============================================================================

#[tokio::test]
async fn test_send_request_success() {
    let app = TestApp::new();
    let requester = app.create_user();
    let responder = app.create_user();

    let body = send_request(&app, &requester, &responder).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["fromUserId"], requester.id.to_string());
    assert_eq!(body["toUserId"], responder.id.to_string());
    assert!(body["createdAlertId"].is_null());

    let sent = app.push.sent_of(NotificationType::NewRequest);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, responder.push_token);
}

#[tokio::test]
async fn test_send_request_rejects_bad_input() {
    let app = TestApp::new();
    let requester = app.create_user();
    let responder = app.create_user();

    // To self
    let response = app
        .send(json_request_as(
            Method::POST,
            "/api/v1/requests",
            json!({ "toUserId": requester.id }),
            requester.id,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Half a coordinate
    let response = app
        .send(json_request_as(
            Method::POST,
            "/api/v1/requests",
            json!({ "toUserId": responder.id, "destinationLatitude": 41.1 }),
            requester.id,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown addressee
    let response = app
        .send(json_request_as(
            Method::POST,
            "/api/v1/requests",
            json!({ "toUserId": uuid::Uuid::new_v4() }),
            requester.id,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pending_and_sent_lists() {
    let app = TestApp::new();
    let requester = app.create_user();
    let responder = app.create_user();

    send_request(&app, &requester, &responder).await;

    let body = parse_response_body(
        app.send(get_request_as("/api/v1/requests/pending", responder.id))
            .await,
    )
    .await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["requests"][0]["fromUserId"], requester.id.to_string());

    let body = parse_response_body(
        app.send(get_request_as("/api/v1/requests/sent", requester.id))
            .await,
    )
    .await;
    assert_eq!(body["total"], 1);

    // Requester has nothing pending
    let body = parse_response_body(
        app.send(get_request_as("/api/v1/requests/pending", requester.id))
            .await,
    )
    .await;
    assert_eq!(body["total"], 0);
}

// ============================================================================
// Respond Tests
// ============================================================================

#[tokio::test]
async fn test_accept_request_creates_alert() {
    let app = TestApp::new();
    let requester = app.create_user();
    let responder = app.create_tracked_user();

    let request = send_request(&app, &requester, &responder).await;

    let response = app
        .send(json_request_as(
            Method::POST,
            &respond_uri(&request),
            json!({ "action": "accept" }),
            responder.id,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["request"]["status"], "accepted");
    assert!(body["request"]["respondedAt"].is_string());

    let alert = &body["alert"];
    assert_eq!(alert["status"], "active");
    assert_eq!(alert["ownerId"], responder.id.to_string());
    assert_eq!(alert["fallbackMinutes"], 60);
    assert_eq!(alert["destination"]["name"], "Grandma's");
    assert_eq!(body["request"]["createdAlertId"], alert["id"]);

    // Requester is the sole recipient and hears about the acceptance
    let detail = parse_response_body(
        app.send(get_request_as(
            &format!("/api/v1/alerts/{}", alert["id"].as_str().unwrap()),
            requester.id,
        ))
        .await,
    )
    .await;
    assert_eq!(detail["recipients"].as_array().unwrap().len(), 1);
    assert_eq!(
        detail["recipients"][0]["recipientId"],
        requester.id.to_string()
    );

    let accepted = app.push.sent_of(NotificationType::RequestAccepted);
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].0, requester.push_token);

    let active = parse_response_body(
        app.send(get_request_as("/api/v1/alerts/active", responder.id))
            .await,
    )
    .await;
    assert_eq!(active["id"], alert["id"]);
}

#[tokio::test]
async fn test_accept_without_permission_keeps_request_pending() {
    let app = TestApp::new();
    let requester = app.create_user();
    let responder = app.create_user();

    let request = send_request(&app, &requester, &responder).await;

    let response = app
        .send(json_request_as(
            Method::POST,
            &respond_uri(&request),
            json!({ "action": "accept" }),
            responder.id,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        parse_response_body(response).await["error"],
        "permission_denied"
    );

    let body = parse_response_body(
        app.send(get_request_as("/api/v1/requests/pending", responder.id))
            .await,
    )
    .await;
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn test_reject_request() {
    let app = TestApp::new();
    let requester = app.create_user();
    let responder = app.create_user();

    let request = send_request(&app, &requester, &responder).await;

    let response = app
        .send(json_request_as(
            Method::POST,
            &respond_uri(&request),
            json!({ "action": "reject" }),
            responder.id,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["request"]["status"], "rejected");
    assert!(body.get("alert").is_none());
    assert!(body["request"]["createdAlertId"].is_null());

    // Rejection is silent towards the requester
    assert!(app.push.sent_of(NotificationType::RequestAccepted).is_empty());
}

#[tokio::test]
async fn test_request_can_be_answered_once() {
    let app = TestApp::new();
    let requester = app.create_user();
    let responder = app.create_tracked_user();

    let request = send_request(&app, &requester, &responder).await;

    let first = app
        .send(json_request_as(
            Method::POST,
            &respond_uri(&request),
            json!({ "action": "reject" }),
            responder.id,
        ))
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .send(json_request_as(
            Method::POST,
            &respond_uri(&request),
            json!({ "action": "accept" }),
            responder.id,
        ))
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let active = parse_response_body(
        app.send(get_request_as("/api/v1/alerts/active", responder.id))
            .await,
    )
    .await;
    assert!(active.is_null());
}

#[tokio::test]
async fn test_only_addressee_can_respond() {
    let app = TestApp::new();
    let requester = app.create_user();
    let responder = app.create_tracked_user();

    let request = send_request(&app, &requester, &responder).await;

    let response = app
        .send(json_request_as(
            Method::POST,
            &respond_uri(&request),
            json!({ "action": "accept" }),
            requester.id,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(json_request_as(
            Method::POST,
            &format!("/api/v1/requests/{}/respond", uuid::Uuid::new_v4()),
            json!({ "action": "accept" }),
            responder.id,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expired_request_cannot_be_accepted() {
    let app = TestApp::new();
    let requester = app.create_user();
    let responder = app.create_tracked_user();

    let request = send_request(&app, &requester, &responder).await;

    let expired = app
        .state
        .requests
        .expire_overdue(Utc::now() + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(expired, 1);

    let response = app
        .send(json_request_as(
            Method::POST,
            &respond_uri(&request),
            json!({ "action": "accept" }),
            responder.id,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = parse_response_body(
        app.send(get_request_as("/api/v1/requests/sent", requester.id))
            .await,
    )
    .await;
    assert_eq!(body["requests"][0]["status"], "expired");
}
