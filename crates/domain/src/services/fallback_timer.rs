//! Fallback timer: one deadline per alert, firing `Timeout` at most once.
//!
//! The timer is best-effort acceleration only. Timers do not survive a
//! restart; the periodic sweep over persisted deadlines covers that gap.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::event::AlertEvent;

struct Scheduled {
    generation: u64,
    deadline: DateTime<Utc>,
    task: JoinHandle<()>,
}

type Timers = Arc<Mutex<HashMap<Uuid, Scheduled>>>;

fn lock(timers: &Timers) -> MutexGuard<'_, HashMap<Uuid, Scheduled>> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct FallbackTimer {
    events: mpsc::UnboundedSender<AlertEvent>,
    timers: Timers,
    generation: AtomicU64,
}

impl FallbackTimer {
    pub fn new(events: mpsc::UnboundedSender<AlertEvent>) -> Self {
        Self {
            events,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Arms a one-shot timer for `deadline`, replacing any earlier one for
    /// the same alert. A deadline in the past fires immediately.
    pub fn schedule(&self, alert_id: Uuid, deadline: DateTime<Utc>) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let delay = (deadline - Utc::now()).to_std().unwrap_or_default();
        let timers = Arc::clone(&self.timers);
        let events = self.events.clone();

        let mut guard = lock(&self.timers);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let fired = {
                let mut timers = lock(&timers);
                match timers.get(&alert_id) {
                    Some(entry) if entry.generation == generation => {
                        timers.remove(&alert_id);
                        true
                    }
                    _ => false,
                }
            };
            if fired {
                tracing::debug!(alert_id = %alert_id, "Fallback timer fired");
                if events.send(AlertEvent::timeout(alert_id)).is_err() {
                    tracing::warn!(alert_id = %alert_id, "Alert engine stopped, timeout dropped");
                }
            }
        });
        let scheduled = Scheduled {
            generation,
            deadline,
            task,
        };
        if let Some(previous) = guard.insert(alert_id, scheduled) {
            previous.task.abort();
        }
        drop(guard);

        tracing::debug!(alert_id = %alert_id, deadline = %deadline, "Fallback timer scheduled");
    }

    /// Disarms the timer. A cancel that loses the race with firing is a
    /// no-op and returns `false`.
    pub fn cancel(&self, alert_id: Uuid) -> bool {
        match lock(&self.timers).remove(&alert_id) {
            Some(scheduled) => {
                scheduled.task.abort();
                tracing::debug!(alert_id = %alert_id, "Fallback timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn deadline(&self, alert_id: Uuid) -> Option<DateTime<Utc>> {
        lock(&self.timers).get(&alert_id).map(|s| s.deadline)
    }

    pub fn is_scheduled(&self, alert_id: Uuid) -> bool {
        lock(&self.timers).contains_key(&alert_id)
    }

    pub fn scheduled_count(&self) -> usize {
        lock(&self.timers).len()
    }
}

impl Drop for FallbackTimer {
    fn drop(&mut self) {
        for (_, scheduled) in lock(&self.timers).drain() {
            scheduled.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::event::AlertEventKind;
    use chrono::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_at_deadline() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = FallbackTimer::new(tx);
        let alert = Uuid::new_v4();

        timer.schedule(alert, Utc::now() + Duration::minutes(60));
        assert!(timer.is_scheduled(alert));

        tokio::time::sleep(std::time::Duration::from_secs(59 * 60)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(std::time::Duration::from_secs(2 * 60)).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.alert_id, alert);
        assert_eq!(event.kind, AlertEventKind::Timeout);
        assert!(!timer.is_scheduled(alert));
        assert!(!timer.cancel(alert));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_timeout() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = FallbackTimer::new(tx);
        let alert = Uuid::new_v4();

        timer.schedule(alert, Utc::now() + Duration::minutes(5));
        assert!(timer.cancel(alert));
        assert!(!timer.cancel(alert));

        tokio::time::sleep(std::time::Duration::from_secs(10 * 60)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(timer.scheduled_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = FallbackTimer::new(tx);
        let alert = Uuid::new_v4();

        timer.schedule(alert, Utc::now() + Duration::minutes(1));
        let later = Utc::now() + Duration::minutes(30);
        timer.schedule(alert, later);
        assert_eq!(timer.deadline(alert), Some(later));

        tokio::time::sleep(std::time::Duration::from_secs(5 * 60)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(std::time::Duration::from_secs(30 * 60)).await;
        assert_eq!(rx.recv().await.map(|e| e.alert_id), Some(alert));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_past_deadline_fires_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = FallbackTimer::new(tx);
        let alert = Uuid::new_v4();

        timer.schedule(alert, Utc::now() - Duration::minutes(1));
        let event = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, AlertEventKind::Timeout);
    }
}
