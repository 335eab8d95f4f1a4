//! Geofence monitor: one circular region per in-flight alert.
//!
//! A region fires a single `Enter` event the first time a position recorded
//! at or after the alert's creation falls inside it, then removes itself. Leaving the region is
//! not an event, so re-entering never fires again.

use chrono::{DateTime, Utc};
use shared::geodesy::Coordinates;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::event::AlertEvent;
use super::location_provider::{LocationProvider, UpdateOptions};
use crate::error::EngineError;

struct Region {
    generation: u64,
    task: JoinHandle<()>,
}

type Regions = Arc<Mutex<HashMap<Uuid, Region>>>;

fn lock(regions: &Regions) -> MutexGuard<'_, HashMap<Uuid, Region>> {
    regions.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the region only if it is still the one armed as `generation`.
fn claim(regions: &Regions, alert_id: Uuid, generation: u64) -> bool {
    let mut regions = lock(regions);
    match regions.get(&alert_id) {
        Some(region) if region.generation == generation => {
            regions.remove(&alert_id);
            true
        }
        _ => false,
    }
}

pub struct GeofenceMonitor {
    provider: Arc<dyn LocationProvider>,
    events: mpsc::UnboundedSender<AlertEvent>,
    regions: Regions,
    generation: AtomicU64,
}

impl GeofenceMonitor {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        events: mpsc::UnboundedSender<AlertEvent>,
    ) -> Self {
        Self {
            provider,
            events,
            regions: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Registers the region for `alert_id`, replacing any earlier one.
    /// Positions recorded before `not_before` never count as an entry, so a
    /// late report from an earlier trip cannot complete a new alert.
    /// Fails with `PermissionDenied` when the owner has not granted
    /// background location access.
    pub async fn arm(
        &self,
        alert_id: Uuid,
        owner_id: Uuid,
        center: Coordinates,
        radius_meters: f64,
        not_before: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if !self
            .provider
            .background_permission(owner_id)
            .await
            .is_granted()
        {
            return Err(EngineError::PermissionDenied);
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let mut subscription = self
            .provider
            .subscribe(owner_id, UpdateOptions::every_update());
        let regions = Arc::clone(&self.regions);
        let events = self.events.clone();

        // The task claims its entry under this lock, so it cannot fire before
        // the entry exists.
        let mut guard = lock(&self.regions);
        let task = tokio::spawn(async move {
            while let Some(position) = subscription.next().await {
                if position.recorded_at < not_before {
                    tracing::debug!(
                        alert_id = %alert_id,
                        recorded_at = %position.recorded_at,
                        "Ignoring position recorded before the alert"
                    );
                    continue;
                }
                if !position.coordinates().is_within(&center, radius_meters) {
                    continue;
                }
                if claim(&regions, alert_id, generation) {
                    tracing::debug!(alert_id = %alert_id, "Geofence entered");
                    if events.send(AlertEvent::enter(alert_id)).is_err() {
                        tracing::warn!(alert_id = %alert_id, "Alert engine stopped, enter dropped");
                    }
                }
                return;
            }
        });
        if let Some(previous) = guard.insert(alert_id, Region { generation, task }) {
            previous.task.abort();
        }
        drop(guard);

        tracing::debug!(
            alert_id = %alert_id,
            radius_meters = radius_meters,
            "Geofence armed"
        );
        Ok(())
    }

    /// Removes the region. Returns whether one was armed.
    pub fn disarm(&self, alert_id: Uuid) -> bool {
        match lock(&self.regions).remove(&alert_id) {
            Some(region) => {
                region.task.abort();
                tracing::debug!(alert_id = %alert_id, "Geofence disarmed");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, alert_id: Uuid) -> bool {
        lock(&self.regions).contains_key(&alert_id)
    }

    pub fn armed_count(&self) -> usize {
        lock(&self.regions).len()
    }
}

impl Drop for GeofenceMonitor {
    fn drop(&mut self) {
        for (_, region) in lock(&self.regions).drain() {
            region.task.abort();
        }
    }
}
