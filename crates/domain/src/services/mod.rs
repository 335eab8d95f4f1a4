//! Domain services for Arrival Guard.
//!
//! The alert engine, its trigger sources (geofence, fallback timer, location
//! updates), notification dispatch, request handling and the collaborator
//! traits they depend on.

pub mod dispatcher;
pub mod engine;
pub mod event;
pub mod fallback_timer;
pub mod geofence;
pub mod location_pipeline;
pub mod location_provider;
pub mod memory_store;
pub mod notification;
pub mod requests;
pub mod store;

pub use dispatcher::{DispatchReport, NotificationDispatcher, NotificationKind};
pub use engine::{
    AlertEngine, EngineSettings, RecoveryReport, SweepReport, TrackingState, TransitionReport,
};
pub use event::{AlertEvent, AlertEventKind};
pub use fallback_timer::FallbackTimer;
pub use geofence::GeofenceMonitor;
pub use location_pipeline::LocationUpdatePipeline;
pub use location_provider::{
    DeviceLocationProvider, LocationProvider, PositionSubscription, UpdateOptions,
};
pub use memory_store::InMemoryStore;
pub use notification::{
    MockPushSender, NotificationData, NotificationResult, NotificationType, PushMessage,
    PushSender,
};
pub use requests::{RequestService, RequestSettings};
pub use store::{AlertStore, ProfileDirectory, RequestStore, TransitionOutcome};
