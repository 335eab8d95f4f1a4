//! Alert recipient join model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One (alert, recipient) pair. `notified_at` is stamped at most once,
/// after a successful delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecipient {
    pub alert_id: Uuid,
    pub recipient_id: Uuid,
    pub notified_at: Option<DateTime<Utc>>,
}

impl AlertRecipient {
    pub fn pending(alert_id: Uuid, recipient_id: Uuid) -> Self {
        Self {
            alert_id,
            recipient_id,
            notified_at: None,
        }
    }
}
