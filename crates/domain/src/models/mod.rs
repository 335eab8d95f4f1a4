//! Domain models for Arrival Guard.

pub mod alert;
pub mod alert_recipient;
pub mod position;
pub mod profile;
pub mod request;

pub use alert::{
    Alert, AlertDetailResponse, AlertHistoryQuery, AlertResponse, AlertStatus, CreateAlertRequest,
    Destination, ListAlertsResponse, NewAlert, DEFAULT_RADIUS_METERS, MAX_FALLBACK_MINUTES,
    MAX_RADIUS_METERS, MIN_RADIUS_METERS,
};
pub use alert_recipient::AlertRecipient;
pub use position::{LocationPermission, Position, ReportPermissionRequest, ReportPositionRequest};
pub use profile::Profile;
pub use request::{
    ArrivalRequest, ListRequestsResponse, NewArrivalRequest, RequestStatus, RespondAction,
    RespondRequestPayload, RespondRequestResponse, SendRequestPayload,
};
