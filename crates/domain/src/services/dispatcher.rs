//! Notification dispatcher.
//!
//! Resolves recipient push addresses and delivers one message per recipient
//! concurrently. A failure for one recipient never affects the others and is
//! never propagated; the caller only gets a [`DispatchReport`].

use chrono::Utc;
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::notification::{NotificationResult, PushMessage, PushSender};
use super::store::{AlertStore, ProfileDirectory};
use crate::models::profile::display_name_of;
use crate::models::{Alert, ArrivalRequest};

/// Message kinds tied to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Arrived,
    Fallback,
    RequestAccepted { request_id: Uuid },
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Arrived => "arrived",
            NotificationKind::Fallback => "fallback",
            NotificationKind::RequestAccepted { .. } => "request_accepted",
        }
    }

    /// Only arrival outcomes stamp the recipient rows.
    fn stamps_recipients(&self) -> bool {
        matches!(self, NotificationKind::Arrived | NotificationKind::Fallback)
    }
}

/// Per-batch delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.sent + self.failed + self.skipped
    }

    fn record(&mut self, result: &NotificationResult) {
        match result {
            NotificationResult::Sent => self.sent += 1,
            NotificationResult::Failed(_) => self.failed += 1,
            NotificationResult::NoToken | NotificationResult::Skipped => self.skipped += 1,
        }
    }
}

pub struct NotificationDispatcher {
    sender: Arc<dyn PushSender>,
    alerts: Arc<dyn AlertStore>,
    profiles: Arc<dyn ProfileDirectory>,
}

impl NotificationDispatcher {
    pub fn new(
        sender: Arc<dyn PushSender>,
        alerts: Arc<dyn AlertStore>,
        profiles: Arc<dyn ProfileDirectory>,
    ) -> Self {
        Self {
            sender,
            alerts,
            profiles,
        }
    }

    /// Notifies `recipient_ids` about `alert`.
    pub async fn notify(
        &self,
        kind: NotificationKind,
        alert: &Alert,
        recipient_ids: &[Uuid],
    ) -> DispatchReport {
        let owner_name = self.display_name(alert.owner_id).await;
        let message = match kind {
            NotificationKind::Arrived => {
                PushMessage::arrived(&owner_name, &alert.destination.name, alert.id)
            }
            NotificationKind::Fallback => PushMessage::fallback(
                &owner_name,
                &alert.destination.name,
                alert.id,
                alert.last_known.as_ref(),
            ),
            NotificationKind::RequestAccepted { request_id } => {
                PushMessage::request_accepted(&owner_name, request_id, alert.id)
            }
        };
        let stamp_alert = kind.stamps_recipients().then_some(alert.id);

        let report = self
            .deliver(kind.as_str(), recipient_ids, message, stamp_alert)
            .await;
        tracing::info!(
            alert_id = %alert.id,
            kind = kind.as_str(),
            recipients = recipient_ids.len(),
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "Notifications dispatched"
        );
        report
    }

    /// Tells the addressee of a new request about it.
    pub async fn notify_new_request(&self, request: &ArrivalRequest) -> DispatchReport {
        let requester_name = self.display_name(request.from_user_id).await;
        let message =
            PushMessage::new_request(&requester_name, request.id, request.message.as_deref());

        let report = self
            .deliver("new_request", &[request.to_user_id], message, None)
            .await;
        tracing::info!(
            request_id = %request.id,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "New request notification dispatched"
        );
        report
    }

    async fn display_name(&self, user_id: Uuid) -> String {
        match self.profiles.find_profile(user_id).await {
            Ok(profile) => display_name_of(profile.as_ref()),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to load profile for display name");
                display_name_of(None)
            }
        }
    }

    async fn deliver(
        &self,
        kind: &'static str,
        recipient_ids: &[Uuid],
        message: PushMessage,
        stamp_alert: Option<Uuid>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        let addresses: HashMap<Uuid, String> = match self.profiles.find_profiles(recipient_ids).await
        {
            Ok(profiles) => profiles
                .iter()
                .filter_map(|p| p.push_address().map(|a| (p.id, a.to_string())))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to resolve push addresses");
                HashMap::new()
            }
        };

        let message = Arc::new(message);
        let mut deliveries = JoinSet::new();
        for &recipient_id in recipient_ids {
            let Some(address) = addresses.get(&recipient_id).cloned() else {
                tracing::debug!(recipient_id = %recipient_id, "Recipient has no push address, skipping");
                counter!("notifications_total", "kind" => kind, "result" => "no_token").increment(1);
                report.record(&NotificationResult::NoToken);
                continue;
            };

            let sender = Arc::clone(&self.sender);
            let alerts = Arc::clone(&self.alerts);
            let message = Arc::clone(&message);
            deliveries.spawn(async move {
                let result = sender.send(&address, &message).await;
                if let (NotificationResult::Sent, Some(alert_id)) = (&result, stamp_alert) {
                    if let Err(e) = alerts
                        .mark_recipient_notified(alert_id, recipient_id, Utc::now())
                        .await
                    {
                        tracing::warn!(
                            alert_id = %alert_id,
                            recipient_id = %recipient_id,
                            error = %e,
                            "Failed to stamp notified_at"
                        );
                    }
                }
                if let NotificationResult::Failed(reason) = &result {
                    tracing::warn!(recipient_id = %recipient_id, reason = %reason, "Push delivery failed");
                }
                result
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            let result = joined
                .unwrap_or_else(|e| NotificationResult::Failed(format!("delivery task: {}", e)));
            counter!("notifications_total", "kind" => kind, "result" => result.as_str())
                .increment(1);
            report.record(&result);
        }

        report
    }
}
