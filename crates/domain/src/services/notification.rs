//! Push notification messages and the delivery abstraction.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::Position;

/// Notification type carried in the payload `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Arrival,
    Fallback,
    RequestAccepted,
    NewRequest,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Arrival => "arrival",
            NotificationType::Fallback => "fallback",
            NotificationType::RequestAccepted => "request_accepted",
            NotificationType::NewRequest => "new_request",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data payload attached to a push message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_lng: Option<f64>,
}

impl NotificationData {
    fn new(notification_type: NotificationType) -> Self {
        Self {
            notification_type,
            alert_id: None,
            request_id: None,
            last_lat: None,
            last_lng: None,
        }
    }
}

/// A rendered push message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: NotificationData,
}

impl PushMessage {
    pub fn arrived(owner_name: &str, destination: &str, alert_id: Uuid) -> Self {
        let mut data = NotificationData::new(NotificationType::Arrival);
        data.alert_id = Some(alert_id);
        Self {
            title: "Arrived safely".to_string(),
            body: format!("{} arrived at {}", owner_name, destination),
            data,
        }
    }

    pub fn fallback(
        owner_name: &str,
        destination: &str,
        alert_id: Uuid,
        last_known: Option<&Position>,
    ) -> Self {
        let mut data = NotificationData::new(NotificationType::Fallback);
        data.alert_id = Some(alert_id);
        data.last_lat = last_known.map(|p| p.latitude);
        data.last_lng = last_known.map(|p| p.longitude);

        let hint = if last_known.is_some() {
            " Last known location available."
        } else {
            " We recommend contacting them."
        };
        Self {
            title: "Did not arrive".to_string(),
            body: format!("{} did not arrive at {}.{}", owner_name, destination, hint),
            data,
        }
    }

    pub fn request_accepted(responder_name: &str, request_id: Uuid, alert_id: Uuid) -> Self {
        let mut data = NotificationData::new(NotificationType::RequestAccepted);
        data.request_id = Some(request_id);
        data.alert_id = Some(alert_id);
        Self {
            title: "Request accepted".to_string(),
            body: format!(
                "{} agreed to let you know when they arrive",
                responder_name
            ),
            data,
        }
    }

    pub fn new_request(requester_name: &str, request_id: Uuid, message: Option<&str>) -> Self {
        let mut data = NotificationData::new(NotificationType::NewRequest);
        data.request_id = Some(request_id);

        let mut body = format!(
            "{} asked you to let them know when you arrive",
            requester_name
        );
        if let Some(message) = message.map(str::trim).filter(|m| !m.is_empty()) {
            body.push_str(": ");
            body.push_str(message);
        }
        Self {
            title: "New arrival request".to_string(),
            body,
            data,
        }
    }
}

/// Result of a notification send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    /// Notification was handed to the push service.
    Sent,
    /// Recipient has no usable push address.
    NoToken,
    /// Delivery failed; recovered locally, never propagated.
    Failed(String),
    /// Not attempted.
    Skipped,
}

impl NotificationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationResult::Sent => "sent",
            NotificationResult::NoToken => "no_token",
            NotificationResult::Failed(_) => "failed",
            NotificationResult::Skipped => "skipped",
        }
    }
}

/// Push delivery collaborator. Must tolerate malformed or unknown addresses
/// by returning `NoToken` or `Failed` rather than panicking.
#[async_trait::async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, address: &str, message: &PushMessage) -> NotificationResult;
}

/// Mock push sender for development and testing.
///
/// Logs and records every message instead of delivering it.
#[derive(Debug, Default)]
pub struct MockPushSender {
    sent: Mutex<Vec<(String, PushMessage)>>,
    failing: Mutex<HashSet<String>>,
}

impl MockPushSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send to `address` fail.
    pub fn fail_address(&self, address: impl Into<String>) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(address.into());
        }
    }

    /// Every successfully "sent" message so far.
    pub fn sent(&self) -> Vec<(String, PushMessage)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Sent messages of one type.
    pub fn sent_of(&self, notification_type: NotificationType) -> Vec<(String, PushMessage)> {
        self.sent()
            .into_iter()
            .filter(|(_, m)| m.data.notification_type == notification_type)
            .collect()
    }
}

#[async_trait::async_trait]
impl PushSender for MockPushSender {
    async fn send(&self, address: &str, message: &PushMessage) -> NotificationResult {
        let should_fail = self
            .failing
            .lock()
            .map(|f| f.contains(address))
            .unwrap_or(false);
        if should_fail {
            tracing::warn!(
                address = %address,
                notification_type = %message.data.notification_type,
                "Mock push sender simulating failure"
            );
            return NotificationResult::Failed("Simulated failure".to_string());
        }

        tracing::info!(
            address = %address,
            notification_type = %message.data.notification_type,
            title = %message.title,
            "Mock: Would send push notification"
        );
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((address.to_string(), message.clone()));
        }
        NotificationResult::Sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_notification_type_display() {
        assert_eq!(NotificationType::Arrival.to_string(), "arrival");
        assert_eq!(NotificationType::Fallback.to_string(), "fallback");
        assert_eq!(
            NotificationType::RequestAccepted.to_string(),
            "request_accepted"
        );
        assert_eq!(NotificationType::NewRequest.to_string(), "new_request");
    }

    #[test]
    fn test_arrived_message() {
        let message = PushMessage::arrived("Ana", "Home", Uuid::nil());
        assert_eq!(message.title, "Arrived safely");
        assert_eq!(message.body, "Ana arrived at Home");

        let json = serde_json::to_value(&message.data).unwrap();
        assert_eq!(json["type"], "arrival");
        assert!(json.get("last_lat").is_none());
    }

    #[test]
    fn test_fallback_message_with_position() {
        let position = Position::new(40.5, -3.5, Utc::now());
        let message = PushMessage::fallback("Ana", "Home", Uuid::nil(), Some(&position));
        assert_eq!(
            message.body,
            "Ana did not arrive at Home. Last known location available."
        );

        let json = serde_json::to_value(&message.data).unwrap();
        assert_eq!(json["type"], "fallback");
        assert_eq!(json["last_lat"], 40.5);
        assert_eq!(json["last_lng"], -3.5);
    }

    #[test]
    fn test_fallback_message_without_position() {
        let message = PushMessage::fallback("Ana", "Home", Uuid::nil(), None);
        assert_eq!(
            message.body,
            "Ana did not arrive at Home. We recommend contacting them."
        );
        assert!(message.data.last_lat.is_none());
    }

    #[test]
    fn test_new_request_message() {
        let plain = PushMessage::new_request("Bo", Uuid::nil(), None);
        assert_eq!(plain.body, "Bo asked you to let them know when you arrive");

        let with_note = PushMessage::new_request("Bo", Uuid::nil(), Some("late train"));
        assert_eq!(
            with_note.body,
            "Bo asked you to let them know when you arrive: late train"
        );
    }

    #[tokio::test]
    async fn test_mock_push_sender_records_and_fails() {
        let sender = MockPushSender::new();
        sender.fail_address("ExponentPushToken[bad]");
        let message = PushMessage::request_accepted("Bo", Uuid::nil(), Uuid::nil());

        let ok = sender.send("ExponentPushToken[good]", &message).await;
        assert_eq!(ok, NotificationResult::Sent);
        let failed = sender.send("ExponentPushToken[bad]", &message).await;
        assert!(matches!(failed, NotificationResult::Failed(_)));

        assert_eq!(sender.sent().len(), 1);
        assert_eq!(sender.sent_of(NotificationType::RequestAccepted).len(), 1);
        assert!(sender.sent_of(NotificationType::Arrival).is_empty());
    }
}
