//! Location update pipeline: persists the owner's last known position while
//! an alert is active.
//!
//! Writes go through `record_position_if_active`, so a write racing a
//! terminal transition is dropped by the store. The first dropped write
//! ends the pipeline. Positions older than the last one written are skipped,
//! so the stored position never moves backwards in time.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::location_provider::{LocationProvider, UpdateOptions};
use super::store::AlertStore;

type Pipelines = Arc<Mutex<HashMap<Uuid, (u64, JoinHandle<()>)>>>;

fn lock(pipelines: &Pipelines) -> MutexGuard<'_, HashMap<Uuid, (u64, JoinHandle<()>)>> {
    pipelines.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct LocationUpdatePipeline {
    provider: Arc<dyn LocationProvider>,
    store: Arc<dyn AlertStore>,
    options: UpdateOptions,
    pipelines: Pipelines,
    generation: AtomicU64,
}

impl LocationUpdatePipeline {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        store: Arc<dyn AlertStore>,
        options: UpdateOptions,
    ) -> Self {
        Self {
            provider,
            store,
            options,
            pipelines: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Starts forwarding gated positions of `owner_id` into `alert_id`.
    /// Positions recorded before `since` are dropped.
    pub fn start(&self, alert_id: Uuid, owner_id: Uuid, since: DateTime<Utc>) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let mut subscription = self.provider.subscribe(owner_id, self.options);
        let store = Arc::clone(&self.store);
        let pipelines = Arc::clone(&self.pipelines);

        let mut guard = lock(&self.pipelines);
        let task = tokio::spawn(async move {
            let mut latest = since;
            while let Some(position) = subscription.next().await {
                if position.recorded_at < latest {
                    tracing::debug!(
                        alert_id = %alert_id,
                        recorded_at = %position.recorded_at,
                        "Skipping out-of-date position"
                    );
                    continue;
                }
                match store.record_position_if_active(alert_id, &position).await {
                    Ok(true) => {
                        latest = position.recorded_at;
                        tracing::debug!(alert_id = %alert_id, "Last known position recorded");
                    }
                    Ok(false) => {
                        tracing::debug!(alert_id = %alert_id, "Alert no longer active, stopping location updates");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(alert_id = %alert_id, error = %e, "Failed to record position");
                    }
                }
            }
            let mut pipelines = lock(&pipelines);
            if pipelines.get(&alert_id).map(|(g, _)| *g) == Some(generation) {
                pipelines.remove(&alert_id);
            }
        });
        if let Some((_, previous)) = guard.insert(alert_id, (generation, task)) {
            previous.abort();
        }
        drop(guard);

        tracing::debug!(alert_id = %alert_id, owner_id = %owner_id, "Location updates started");
    }

    /// Stops the pipeline. Returns whether one was running.
    pub fn stop(&self, alert_id: Uuid) -> bool {
        match lock(&self.pipelines).remove(&alert_id) {
            Some((_, task)) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, alert_id: Uuid) -> bool {
        lock(&self.pipelines).contains_key(&alert_id)
    }
}

impl Drop for LocationUpdatePipeline {
    fn drop(&mut self) {
        for (_, (_, task)) in lock(&self.pipelines).drain() {
            task.abort();
        }
    }
}
