//! Alert engine: the lifecycle controller for arrival alerts.
//!
//! Geofence entries, local timer expiries, sweep-detected timeouts, manual
//! arrivals and cancellations all become [`AlertEvent`]s handled by
//! [`AlertEngine::handle_event`]. The terminal transition is a single
//! conditional write in the store; whichever event commits first wins and
//! every later one is a no-op. Side effects (teardown, notification) run only
//! for the winner, except teardown which is idempotent and always runs.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;
use validator::Validate;

use super::dispatcher::{DispatchReport, NotificationDispatcher, NotificationKind};
use super::event::{AlertEvent, AlertEventKind};
use super::fallback_timer::FallbackTimer;
use super::geofence::GeofenceMonitor;
use super::location_pipeline::LocationUpdatePipeline;
use super::location_provider::{LocationProvider, UpdateOptions};
use super::notification::PushSender;
use super::store::{AlertStore, ProfileDirectory, TransitionOutcome};
use crate::error::EngineError;
use crate::models::{
    Alert, AlertRecipient, AlertStatus, CreateAlertRequest, DEFAULT_RADIUS_METERS,
};

const MAX_HISTORY_LIMIT: i64 = 100;

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_radius_meters: i32,
    pub location_updates: UpdateOptions,
    pub sweep_batch_size: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_radius_meters: DEFAULT_RADIUS_METERS,
            location_updates: UpdateOptions::new(Duration::from_secs(300), 100.0),
            sweep_batch_size: 500,
        }
    }
}

/// What handling one event did.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionReport {
    pub alert_id: Uuid,
    pub event: AlertEventKind,
    /// Whether this event's conditional write committed.
    pub applied: bool,
    /// Status after the attempt, if the alert exists.
    pub status: Option<AlertStatus>,
    pub notifications: Option<DispatchReport>,
}

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub triggered: usize,
    pub lost: usize,
    pub errors: usize,
}

/// What recovery after a restart did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub rearmed: usize,
    pub left_to_sweep: usize,
}

/// Live trigger registrations for one alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingState {
    pub geofence_armed: bool,
    pub timer_scheduled: bool,
    pub pipeline_running: bool,
}

impl TrackingState {
    pub fn is_idle(&self) -> bool {
        !self.geofence_armed && !self.timer_scheduled && !self.pipeline_running
    }
}

pub struct AlertEngine {
    store: Arc<dyn AlertStore>,
    provider: Arc<dyn LocationProvider>,
    dispatcher: NotificationDispatcher,
    geofence: GeofenceMonitor,
    timer: FallbackTimer,
    pipeline: LocationUpdatePipeline,
    settings: EngineSettings,
}

impl AlertEngine {
    /// Builds the engine and spawns its event loop.
    pub fn start(
        store: Arc<dyn AlertStore>,
        profiles: Arc<dyn ProfileDirectory>,
        provider: Arc<dyn LocationProvider>,
        sender: Arc<dyn PushSender>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let engine = Arc::new(Self {
            dispatcher: NotificationDispatcher::new(sender, Arc::clone(&store), profiles),
            geofence: GeofenceMonitor::new(Arc::clone(&provider), events_tx.clone()),
            timer: FallbackTimer::new(events_tx),
            pipeline: LocationUpdatePipeline::new(
                Arc::clone(&provider),
                Arc::clone(&store),
                settings.location_updates,
            ),
            store,
            provider,
            settings,
        });

        tokio::spawn(Self::run(Arc::downgrade(&engine), events_rx));
        engine
    }

    /// Each event is handled on its own task, so a slow push for one alert
    /// never delays the transition of another. Ordering between events of the
    /// same alert is settled by the conditional write.
    async fn run(engine: Weak<Self>, mut events: mpsc::UnboundedReceiver<AlertEvent>) {
        while let Some(event) = events.recv().await {
            let Some(engine) = engine.upgrade() else {
                break;
            };
            tokio::spawn(async move {
                if let Err(e) = engine.handle_event(event).await {
                    tracing::error!(
                        alert_id = %event.alert_id,
                        event = %event.kind,
                        error = %e,
                        "Failed to handle alert event"
                    );
                }
            });
        }
        tracing::debug!("Alert event loop stopped");
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Creates an alert for `owner_id` and arms its triggers. Arming failure
    /// blocks creation: the alert is cancelled and the error returned.
    pub async fn create_alert(
        &self,
        owner_id: Uuid,
        request: CreateAlertRequest,
    ) -> Result<Alert, EngineError> {
        request.validate()?;

        if !self
            .provider
            .background_permission(owner_id)
            .await
            .is_granted()
        {
            return Err(EngineError::PermissionDenied);
        }

        let new_alert =
            request.into_new_alert(owner_id, self.settings.default_radius_meters, Utc::now());
        let alert = self.store.insert_alert(new_alert).await?;
        counter!("alerts_created_total", "source" => "direct").increment(1);

        self.start_tracking(&alert).await?;

        tracing::info!(
            alert_id = %alert.id,
            owner_id = %owner_id,
            fallback_at = %alert.fallback_at,
            radius_meters = alert.destination.radius_meters,
            "Alert created"
        );
        Ok(alert)
    }

    /// Arms geofence, fallback timer and location updates for an alert that
    /// was just inserted. On failure the alert is cancelled so it never
    /// appears active without a monitor.
    pub async fn start_tracking(&self, alert: &Alert) -> Result<(), EngineError> {
        let armed = self
            .geofence
            .arm(
                alert.id,
                alert.owner_id,
                alert.destination.center(),
                f64::from(alert.destination.radius_meters),
                alert.created_at,
            )
            .await;

        if let Err(e) = armed {
            tracing::warn!(alert_id = %alert.id, error = %e, "Arming failed, cancelling alert");
            if let Err(cancel_err) = self
                .store
                .transition_if_active(alert.id, AlertStatus::Cancelled, None)
                .await
            {
                tracing::error!(
                    alert_id = %alert.id,
                    error = %cancel_err,
                    "Failed to cancel alert after arming failure"
                );
            }
            self.teardown(alert.id, Some(alert.owner_id));
            return Err(e);
        }

        self.timer.schedule(alert.id, alert.fallback_at);
        self.pipeline.start(alert.id, alert.owner_id, alert.created_at);
        self.provider.track(alert.owner_id, alert.id);
        Ok(())
    }

    /// Owner cancels the alert. Cancelling a resolved alert changes nothing.
    pub async fn cancel_alert(&self, alert_id: Uuid, caller_id: Uuid) -> Result<Alert, EngineError> {
        self.owner_event(alert_id, caller_id, AlertEventKind::Cancel)
            .await
    }

    /// Owner confirms arrival by hand; same effect as a geofence entry.
    pub async fn confirm_arrival(
        &self,
        alert_id: Uuid,
        caller_id: Uuid,
    ) -> Result<Alert, EngineError> {
        self.owner_event(alert_id, caller_id, AlertEventKind::ManualArrival)
            .await
    }

    async fn owner_event(
        &self,
        alert_id: Uuid,
        caller_id: Uuid,
        kind: AlertEventKind,
    ) -> Result<Alert, EngineError> {
        let alert = self
            .store
            .find_alert(alert_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Alert not found".to_string()))?;
        if alert.owner_id != caller_id {
            return Err(EngineError::Unauthorized(
                "Only the alert owner can do this".to_string(),
            ));
        }

        self.handle_event(AlertEvent::new(alert_id, kind)).await?;
        self.store
            .find_alert(alert_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Alert not found".to_string()))
    }

    /// Applies one event. A lost conditional write is reported, not an error.
    pub async fn handle_event(&self, event: AlertEvent) -> Result<TransitionReport, EngineError> {
        let now = Utc::now();
        let (target, triggered_at, notification) = match event.kind {
            AlertEventKind::Enter | AlertEventKind::ManualArrival => (
                AlertStatus::Completed,
                Some(now),
                Some(NotificationKind::Arrived),
            ),
            AlertEventKind::Timeout => (
                AlertStatus::FallbackTriggered,
                Some(now),
                Some(NotificationKind::Fallback),
            ),
            AlertEventKind::Cancel => (AlertStatus::Cancelled, None, None),
        };

        let outcome = self
            .store
            .transition_if_active(event.alert_id, target, triggered_at)
            .await?;

        match outcome {
            TransitionOutcome::Applied(alert) => {
                counter!("alert_transitions_total", "event" => event.kind.as_str(), "outcome" => "applied")
                    .increment(1);
                tracing::info!(
                    alert_id = %alert.id,
                    event = %event.kind,
                    outcome = "applied",
                    status = %alert.status,
                    "Alert transitioned"
                );
                self.teardown(alert.id, Some(alert.owner_id));

                let notifications = match notification {
                    Some(kind) => Some(self.notify_recipients(kind, &alert).await),
                    None => None,
                };

                Ok(TransitionReport {
                    alert_id: alert.id,
                    event: event.kind,
                    applied: true,
                    status: Some(alert.status),
                    notifications,
                })
            }
            TransitionOutcome::Lost { current } => {
                counter!("alert_transitions_total", "event" => event.kind.as_str(), "outcome" => "lost")
                    .increment(1);
                tracing::debug!(
                    alert_id = %event.alert_id,
                    event = %event.kind,
                    outcome = "lost",
                    current = ?current,
                    "Conditional transition lost"
                );
                self.teardown(event.alert_id, None);

                Ok(TransitionReport {
                    alert_id: event.alert_id,
                    event: event.kind,
                    applied: false,
                    status: current,
                    notifications: None,
                })
            }
        }
    }

    async fn notify_recipients(&self, kind: NotificationKind, alert: &Alert) -> DispatchReport {
        match self.store.list_recipients(alert.id).await {
            Ok(rows) => {
                let ids: Vec<Uuid> = rows.iter().map(|r| r.recipient_id).collect();
                self.dispatcher.notify(kind, alert, &ids).await
            }
            Err(e) => {
                tracing::warn!(alert_id = %alert.id, error = %e, "Failed to load recipients, skipping notifications");
                DispatchReport::default()
            }
        }
    }

    /// Tears down every trigger of the alert. Idempotent.
    fn teardown(&self, alert_id: Uuid, owner_id: Option<Uuid>) {
        self.geofence.disarm(alert_id);
        self.timer.cancel(alert_id);
        self.pipeline.stop(alert_id);
        if let Some(owner_id) = owner_id {
            self.provider.untrack(owner_id, alert_id);
        }
    }

    /// Synthesises `Timeout` for every active alert past its persisted
    /// deadline. This is the authority of record for fallbacks.
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> Result<SweepReport, EngineError> {
        let overdue = self
            .store
            .find_overdue(now, self.settings.sweep_batch_size)
            .await?;

        let mut report = SweepReport {
            scanned: overdue.len(),
            ..SweepReport::default()
        };
        for alert in overdue {
            match self.handle_event(AlertEvent::timeout(alert.id)).await {
                Ok(transition) if transition.applied => report.triggered += 1,
                Ok(_) => report.lost += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(alert_id = %alert.id, error = %e, "Sweep failed to time out alert");
                }
            }
        }

        counter!("fallback_sweep_alerts_total").increment(report.triggered as u64);
        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                triggered = report.triggered,
                lost = report.lost,
                errors = report.errors,
                "Fallback sweep completed"
            );
        }
        Ok(report)
    }

    /// Re-arms triggers for every active alert after a restart. Alerts past
    /// their deadline, and owners without confirmed permission, are left to
    /// the sweep.
    pub async fn recover_active_alerts(&self) -> Result<RecoveryReport, EngineError> {
        let now = Utc::now();
        let mut report = RecoveryReport::default();

        for alert in self.store.list_active().await? {
            if alert.is_overdue(now) {
                report.left_to_sweep += 1;
                continue;
            }
            if self.rearm(&alert).await {
                report.rearmed += 1;
            } else {
                tracing::warn!(
                    alert_id = %alert.id,
                    owner_id = %alert.owner_id,
                    "Owner permission unknown after restart, alert left to sweep"
                );
                report.left_to_sweep += 1;
            }
        }

        tracing::info!(
            rearmed = report.rearmed,
            left_to_sweep = report.left_to_sweep,
            "Active alerts recovered"
        );
        Ok(report)
    }

    /// Re-arms the owner's active alert if its geofence is not armed, e.g.
    /// once the device reports permission again after a restart.
    pub async fn resume_tracking(&self, owner_id: Uuid) -> Result<bool, EngineError> {
        match self.store.find_active_for_owner(owner_id).await? {
            Some(alert) if !self.geofence.is_armed(alert.id) => Ok(self.rearm(&alert).await),
            _ => Ok(false),
        }
    }

    /// Schedules the timer unconditionally and arms geofence plus location
    /// updates when permission allows. Returns whether the geofence is armed.
    async fn rearm(&self, alert: &Alert) -> bool {
        self.timer.schedule(alert.id, alert.fallback_at);
        let armed = self
            .geofence
            .arm(
                alert.id,
                alert.owner_id,
                alert.destination.center(),
                f64::from(alert.destination.radius_meters),
                alert.created_at,
            )
            .await
            .is_ok();
        if armed {
            let since = alert
                .last_known
                .map_or(alert.created_at, |p| p.recorded_at.max(alert.created_at));
            self.pipeline.start(alert.id, alert.owner_id, since);
            self.provider.track(alert.owner_id, alert.id);
        }
        armed
    }

    /// Alert with its recipients, visible to the owner and the recipients.
    pub async fn get_alert(
        &self,
        alert_id: Uuid,
        caller_id: Uuid,
    ) -> Result<(Alert, Vec<AlertRecipient>), EngineError> {
        let alert = self
            .store
            .find_alert(alert_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Alert not found".to_string()))?;
        let recipients = self.store.list_recipients(alert_id).await?;

        let visible =
            alert.owner_id == caller_id || recipients.iter().any(|r| r.recipient_id == caller_id);
        if !visible {
            return Err(EngineError::Unauthorized(
                "Not a participant of this alert".to_string(),
            ));
        }
        Ok((alert, recipients))
    }

    pub async fn active_alert(&self, owner_id: Uuid) -> Result<Option<Alert>, EngineError> {
        self.store.find_active_for_owner(owner_id).await
    }

    pub async fn history(&self, owner_id: Uuid, limit: i64) -> Result<Vec<Alert>, EngineError> {
        self.store
            .list_history(owner_id, limit.clamp(1, MAX_HISTORY_LIMIT))
            .await
    }

    pub fn tracking_state(&self, alert_id: Uuid) -> TrackingState {
        TrackingState {
            geofence_armed: self.geofence.is_armed(alert_id),
            timer_scheduled: self.timer.is_scheduled(alert_id),
            pipeline_running: self.pipeline.is_running(alert_id),
        }
    }
}
