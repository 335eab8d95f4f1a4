//! Position and location-permission models.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use shared::geodesy::Coordinates;
use validator::Validate;

/// A single observed device position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            recorded_at,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// OS-level background location permission as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPermission {
    Granted,
    Denied,
    #[default]
    Undetermined,
}

impl LocationPermission {
    pub fn is_granted(self) -> bool {
        matches!(self, LocationPermission::Granted)
    }
}

/// Request payload for a device position report.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportPositionRequest {
    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: f64,

    /// Capture time in milliseconds since epoch; defaults to receipt time.
    #[validate(custom(function = "shared::validation::validate_timestamp"))]
    pub timestamp: Option<i64>,
}

impl ReportPositionRequest {
    pub fn into_position(self, received_at: DateTime<Utc>) -> Position {
        let recorded_at = self
            .timestamp
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .unwrap_or(received_at);
        Position::new(self.latitude, self.longitude, recorded_at)
    }
}

/// Request payload for a device permission report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPermissionRequest {
    pub background: LocationPermission,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_position_defaults_timestamp() {
        let json = r#"{"latitude": 40.0, "longitude": -3.0}"#;
        let request: ReportPositionRequest = serde_json::from_str(json).unwrap();
        assert!(request.validate().is_ok());

        let now = Utc::now();
        let position = request.into_position(now);
        assert_eq!(position.recorded_at, now);
        assert_eq!(position.latitude, 40.0);
    }

    #[test]
    fn test_report_position_uses_device_timestamp() {
        let captured = Utc::now() - chrono::Duration::minutes(3);
        let request = ReportPositionRequest {
            latitude: 1.0,
            longitude: 2.0,
            timestamp: Some(captured.timestamp_millis()),
        };
        let position = request.into_position(Utc::now());
        assert_eq!(
            position.recorded_at.timestamp_millis(),
            captured.timestamp_millis()
        );
    }

    #[test]
    fn test_report_position_rejects_bad_latitude() {
        let request = ReportPositionRequest {
            latitude: 91.0,
            longitude: 0.0,
            timestamp: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_permission_deserialization() {
        let request: ReportPermissionRequest =
            serde_json::from_str(r#"{"background": "granted"}"#).unwrap();
        assert!(request.background.is_granted());
        assert!(!LocationPermission::default().is_granted());
    }
}
