//! Periodic expiry of unanswered arrival requests.

use chrono::Utc;
use domain::services::RequestService;
use std::sync::Arc;
use std::time::Duration;

use super::scheduler::Job;

pub struct RequestExpiryJob {
    requests: Arc<RequestService>,
}

impl RequestExpiryJob {
    pub fn new(requests: Arc<RequestService>) -> Self {
        Self { requests }
    }
}

#[async_trait::async_trait]
impl Job for RequestExpiryJob {
    fn name(&self) -> &'static str {
        "request_expiry"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(15 * 60)
    }

    async fn execute(&self) -> Result<(), String> {
        self.requests
            .expire_overdue(Utc::now())
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
