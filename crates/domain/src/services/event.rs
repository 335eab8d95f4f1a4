//! Events consumed by the alert state machine.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventKind {
    /// Device observed inside the destination region.
    Enter,
    /// Fallback deadline passed, from the local timer or the sweep.
    Timeout,
    /// Owner confirmed arrival by hand.
    ManualArrival,
    /// Owner cancelled the alert.
    Cancel,
}

impl AlertEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertEventKind::Enter => "enter",
            AlertEventKind::Timeout => "timeout",
            AlertEventKind::ManualArrival => "manual_arrival",
            AlertEventKind::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for AlertEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One trigger for one alert. Every producer names the alert explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertEvent {
    pub alert_id: Uuid,
    pub kind: AlertEventKind,
}

impl AlertEvent {
    pub fn new(alert_id: Uuid, kind: AlertEventKind) -> Self {
        Self { alert_id, kind }
    }

    pub fn enter(alert_id: Uuid) -> Self {
        Self::new(alert_id, AlertEventKind::Enter)
    }

    pub fn timeout(alert_id: Uuid) -> Self {
        Self::new(alert_id, AlertEventKind::Timeout)
    }
}
