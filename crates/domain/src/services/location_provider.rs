//! Location provider: current position on demand plus a gated stream of
//! background position updates, per user.
//!
//! On the server the positions come from device reports, so the provider is
//! fed through [`DeviceLocationProvider::report_position`] and
//! [`DeviceLocationProvider::set_permission`].

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{LocationPermission, Position};

const CHANNEL_CAPACITY: usize = 64;

/// Minimum spacing between delivered updates. An update is delivered when
/// either threshold is met.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateOptions {
    pub min_interval: Duration,
    pub min_distance_meters: f64,
}

impl UpdateOptions {
    pub fn new(min_interval: Duration, min_distance_meters: f64) -> Self {
        Self {
            min_interval,
            min_distance_meters,
        }
    }

    /// Deliver every observed position.
    pub fn every_update() -> Self {
        Self::new(Duration::ZERO, 0.0)
    }

    fn passes(&self, last: &Position, next: &Position) -> bool {
        let elapsed = (next.recorded_at - last.recorded_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if elapsed >= self.min_interval {
            return true;
        }
        next.coordinates().distance_to(&last.coordinates()) >= self.min_distance_meters
    }
}

/// Receiver side of a position subscription.
pub struct PositionSubscription {
    receiver: broadcast::Receiver<Position>,
    options: UpdateOptions,
    last_delivered: Option<Position>,
}

impl PositionSubscription {
    fn new(receiver: broadcast::Receiver<Position>, options: UpdateOptions) -> Self {
        Self {
            receiver,
            options,
            last_delivered: None,
        }
    }

    /// Next position passing the gate. `None` once the provider is gone.
    pub async fn next(&mut self) -> Option<Position> {
        loop {
            match self.receiver.recv().await {
                Ok(position) => {
                    let deliver = self
                        .last_delivered
                        .as_ref()
                        .map(|last| self.options.passes(last, &position))
                        .unwrap_or(true);
                    if deliver {
                        self.last_delivered = Some(position);
                        return Some(position);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped = skipped, "Position subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Last observed position, `PermissionDenied` without background access.
    async fn current_position(&self, user_id: Uuid) -> Result<Position, EngineError>;

    async fn background_permission(&self, user_id: Uuid) -> LocationPermission;

    /// Subscribes to positions observed after this call.
    fn subscribe(&self, user_id: Uuid, options: UpdateOptions) -> PositionSubscription;

    /// Records that `alert_id` is being tracked for `user_id`. A routing hint
    /// only; every callback carries its own alert id.
    fn track(&self, user_id: Uuid, alert_id: Uuid);

    fn untrack(&self, user_id: Uuid, alert_id: Uuid);

    fn tracked_alerts(&self, user_id: Uuid) -> Vec<Uuid>;
}

struct DeviceState {
    permission: LocationPermission,
    last_position: Option<Position>,
    sender: broadcast::Sender<Position>,
    tracked: HashSet<Uuid>,
}

impl DeviceState {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            permission: LocationPermission::default(),
            last_position: None,
            sender,
            tracked: HashSet::new(),
        }
    }
}

/// Location provider fed by device reports.
#[derive(Default)]
pub struct DeviceLocationProvider {
    devices: Mutex<HashMap<Uuid, DeviceState>>,
}

impl DeviceLocationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, DeviceState>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_permission(&self, user_id: Uuid, permission: LocationPermission) {
        self.lock()
            .entry(user_id)
            .or_insert_with(DeviceState::new)
            .permission = permission;
        tracing::debug!(user_id = %user_id, permission = ?permission, "Location permission updated");
    }

    /// Publishes a position to every subscriber of the user. Returns how many
    /// subscribers received it.
    pub fn report_position(&self, user_id: Uuid, position: Position) -> usize {
        let mut devices = self.lock();
        let device = devices.entry(user_id).or_insert_with(DeviceState::new);
        device.last_position = Some(position);
        device.sender.send(position).unwrap_or(0)
    }
}

#[async_trait]
impl LocationProvider for DeviceLocationProvider {
    async fn current_position(&self, user_id: Uuid) -> Result<Position, EngineError> {
        let devices = self.lock();
        let device = devices
            .get(&user_id)
            .ok_or_else(|| EngineError::NotFound("No position reported".to_string()))?;
        if !device.permission.is_granted() {
            return Err(EngineError::PermissionDenied);
        }
        device
            .last_position
            .ok_or_else(|| EngineError::NotFound("No position reported".to_string()))
    }

    async fn background_permission(&self, user_id: Uuid) -> LocationPermission {
        self.lock()
            .get(&user_id)
            .map(|d| d.permission)
            .unwrap_or_default()
    }

    fn subscribe(&self, user_id: Uuid, options: UpdateOptions) -> PositionSubscription {
        let receiver = self
            .lock()
            .entry(user_id)
            .or_insert_with(DeviceState::new)
            .sender
            .subscribe();
        PositionSubscription::new(receiver, options)
    }

    fn track(&self, user_id: Uuid, alert_id: Uuid) {
        self.lock()
            .entry(user_id)
            .or_insert_with(DeviceState::new)
            .tracked
            .insert(alert_id);
    }

    fn untrack(&self, user_id: Uuid, alert_id: Uuid) {
        if let Some(device) = self.lock().get_mut(&user_id) {
            device.tracked.remove(&alert_id);
        }
    }

    fn tracked_alerts(&self, user_id: Uuid) -> Vec<Uuid> {
        self.lock()
            .get(&user_id)
            .map(|d| d.tracked.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_current_position_requires_permission() {
        let provider = DeviceLocationProvider::new();
        let user = Uuid::new_v4();

        provider.report_position(user, Position::new(1.0, 1.0, Utc::now()));
        assert_eq!(
            provider.current_position(user).await,
            Err(EngineError::PermissionDenied)
        );

        provider.set_permission(user, LocationPermission::Granted);
        let position = provider.current_position(user).await.unwrap();
        assert_eq!(position.latitude, 1.0);
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_position() {
        let provider = DeviceLocationProvider::new();
        let user = Uuid::new_v4();
        assert!(matches!(
            provider.current_position(user).await,
            Err(EngineError::NotFound(_))
        ));
        assert_eq!(
            provider.background_permission(user).await,
            LocationPermission::Undetermined
        );
    }

    #[tokio::test]
    async fn test_subscription_gate_time_or_distance() {
        let provider = DeviceLocationProvider::new();
        let user = Uuid::new_v4();
        let options = UpdateOptions::new(Duration::from_secs(300), 100.0);
        let mut subscription = provider.subscribe(user, options);

        let start = Utc::now();
        let first = Position::new(0.0, 0.0, start);
        // 60s later, ~11m away: gated out.
        let near = Position::new(0.0001, 0.0, start + chrono::Duration::seconds(60));
        // 120s later, ~222m away: passes on distance.
        let far = Position::new(0.002, 0.0, start + chrono::Duration::seconds(120));
        // 420s later, same place: passes on time.
        let late = Position::new(0.002, 0.0, start + chrono::Duration::seconds(420));

        for p in [first, near, far, late] {
            provider.report_position(user, p);
        }

        assert_eq!(subscription.next().await, Some(first));
        assert_eq!(subscription.next().await, Some(far));
        assert_eq!(subscription.next().await, Some(late));
    }

    #[tokio::test]
    async fn test_tracking_hint() {
        let provider = DeviceLocationProvider::new();
        let user = Uuid::new_v4();
        let alert = Uuid::new_v4();

        provider.track(user, alert);
        assert_eq!(provider.tracked_alerts(user), vec![alert]);
        provider.untrack(user, alert);
        assert!(provider.tracked_alerts(user).is_empty());
    }
}
