//! Periodic server-side fallback sweep.

use chrono::Utc;
use domain::services::AlertEngine;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;

use super::scheduler::Job;

/// Fires the fallback for active alerts whose deadline passed while no
/// local timer was running, e.g. across a restart.
pub struct FallbackSweepJob {
    engine: Arc<AlertEngine>,
    interval: Duration,
}

impl FallbackSweepJob {
    pub fn new(engine: Arc<AlertEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

#[async_trait::async_trait]
impl Job for FallbackSweepJob {
    fn name(&self) -> &'static str {
        "fallback_sweep"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run_at_start(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .engine
            .sweep_overdue(Utc::now())
            .await
            .map_err(|e| e.to_string())?;

        counter!("fallback_sweep_runs_total").increment(1);
        if report.errors > 0 {
            return Err(format!(
                "{} of {} overdue alerts failed to transition",
                report.errors, report.scanned
            ));
        }
        Ok(())
    }
}
