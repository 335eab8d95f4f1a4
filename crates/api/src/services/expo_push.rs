//! Expo push notification service.
//!
//! Implements [`PushSender`] against the Expo push HTTP API. Addresses that
//! are not Expo push tokens are rejected locally as `NoToken`.

use std::time::Duration;

use domain::services::{NotificationResult, PushMessage, PushSender};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::PushConfig;

/// Prefix every Expo push token carries.
pub const EXPO_TOKEN_PREFIX: &str = "ExponentPushToken";

/// Longest wait between two delivery attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Wait before retry `attempt` (1-based): 200ms, 400ms, 800ms, ... capped at
/// [`MAX_BACKOFF`].
fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    Duration::from_millis(200u64 << exponent).min(MAX_BACKOFF)
}

/// Expo push service client.
pub struct ExpoPushService {
    client: Client,
    config: PushConfig,
}

/// One message in the Expo push request body.
#[derive(Debug, Serialize)]
struct ExpoMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a domain::services::NotificationData,
    sound: &'static str,
    priority: &'static str,
}

#[derive(Debug, Deserialize)]
struct ExpoResponse {
    data: ExpoTicket,
}

#[derive(Debug, Deserialize)]
struct ExpoTicket {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<ExpoTicketDetails>,
}

#[derive(Debug, Deserialize)]
struct ExpoTicketDetails {
    #[serde(default)]
    error: Option<String>,
}

/// Error type for Expo push operations.
#[derive(Debug, thiserror::Error)]
pub enum ExpoPushError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Expo API error: {0}")]
    Api(String),

    #[error("Device is not registered")]
    DeviceNotRegistered,
}

/// Whether `address` looks like an Expo push token.
pub fn is_expo_token(address: &str) -> bool {
    address.starts_with(EXPO_TOKEN_PREFIX)
}

impl ExpoPushService {
    pub fn new(config: PushConfig) -> Result<Self, ExpoPushError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }

    fn interpret_ticket(ticket: ExpoTicket) -> Result<(), ExpoPushError> {
        if ticket.status == "ok" {
            return Ok(());
        }
        let code = ticket.details.and_then(|d| d.error);
        if code.as_deref() == Some("DeviceNotRegistered") {
            return Err(ExpoPushError::DeviceNotRegistered);
        }
        Err(ExpoPushError::Api(
            ticket
                .message
                .or(code)
                .unwrap_or_else(|| "Unknown Expo error".to_string()),
        ))
    }

    async fn post(&self, address: &str, message: &PushMessage) -> Result<(), ExpoPushError> {
        let body = ExpoMessage {
            to: address,
            title: &message.title,
            body: &message.body,
            data: &message.data,
            sound: "default",
            priority: "high",
        };

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let mut request = self.client.post(&self.config.endpoint).json(&body);
            if let Some(token) = &self.config.access_token {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: ExpoResponse = resp.json().await?;
                    return Self::interpret_ticket(parsed.data);
                }
                Ok(resp) if resp.status().is_server_error() => {
                    let error_text = resp.text().await.unwrap_or_default();
                    last_error = Some(ExpoPushError::Api(error_text));
                }
                Ok(resp) => {
                    let error_text = resp.text().await.unwrap_or_default();
                    return Err(ExpoPushError::Api(error_text));
                }
                Err(e) => {
                    last_error = Some(ExpoPushError::Http(e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ExpoPushError::Api("Unknown error".to_string())))
    }
}

#[async_trait::async_trait]
impl PushSender for ExpoPushService {
    async fn send(&self, address: &str, message: &PushMessage) -> NotificationResult {
        if !is_expo_token(address) {
            tracing::debug!(
                notification_type = %message.data.notification_type,
                "Skipping push to non-Expo address"
            );
            return NotificationResult::NoToken;
        }

        match self.post(address, message).await {
            Ok(()) => {
                tracing::debug!(
                    notification_type = %message.data.notification_type,
                    "Push notification sent"
                );
                NotificationResult::Sent
            }
            Err(ExpoPushError::DeviceNotRegistered) => {
                tracing::warn!(
                    notification_type = %message.data.notification_type,
                    "Push token no longer registered"
                );
                NotificationResult::NoToken
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    notification_type = %message.data.notification_type,
                    "Failed to send push notification"
                );
                NotificationResult::Failed(e.to_string())
            }
        }
    }
}
