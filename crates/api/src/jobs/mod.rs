//! Background job scheduler and job implementations.

mod fallback_sweep;
mod pool_metrics;
mod request_expiry;
mod scheduler;

pub use fallback_sweep::FallbackSweepJob;
pub use pool_metrics::PoolMetricsJob;
pub use request_expiry::RequestExpiryJob;
pub use scheduler::{Job, JobScheduler};
