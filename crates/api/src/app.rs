use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use domain::services::{
    AlertEngine, AlertStore, DeviceLocationProvider, InMemoryStore, LocationProvider,
    MockPushSender, ProfileDirectory, PushSender, RequestService, RequestStore,
};
use persistence::repositories::{AlertRepository, ProfileRepository, RequestRepository};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{Config, PushConfig};
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{alerts, health, internal, locations, requests};
use crate::services::expo_push::{ExpoPushError, ExpoPushService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<AlertEngine>,
    pub requests: Arc<RequestService>,
    pub locations: Arc<DeviceLocationProvider>,
    /// Present when backed by PostgreSQL.
    pub pool: Option<PgPool>,
}

/// Storage and delivery collaborators the engine runs over.
pub struct Backends {
    pub alerts: Arc<dyn AlertStore>,
    pub requests: Arc<dyn RequestStore>,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub push: Arc<dyn PushSender>,
    pub pool: Option<PgPool>,
}

impl Backends {
    pub fn postgres(pool: PgPool, push: Arc<dyn PushSender>) -> Self {
        Self {
            alerts: Arc::new(AlertRepository::new(pool.clone())),
            requests: Arc::new(RequestRepository::new(pool.clone())),
            profiles: Arc::new(ProfileRepository::new(pool.clone())),
            push,
            pool: Some(pool),
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>, push: Arc<dyn PushSender>) -> Self {
        Self {
            alerts: store.clone(),
            requests: store.clone(),
            profiles: store,
            push,
            pool: None,
        }
    }
}

/// Push sender selected by `push.provider`.
pub fn build_push_sender(config: &PushConfig) -> Result<Arc<dyn PushSender>, ExpoPushError> {
    match config.provider.as_str() {
        "mock" => Ok(Arc::new(MockPushSender::new())),
        _ => Ok(Arc::new(ExpoPushService::new(config.clone())?)),
    }
}

impl AppState {
    /// Wires the engine and request service over `backends`. Spawns the
    /// engine's event loop, so it must run inside a Tokio runtime.
    pub fn new(config: Config, backends: Backends) -> Self {
        let locations = Arc::new(DeviceLocationProvider::new());
        let provider: Arc<dyn LocationProvider> = locations.clone();

        let engine = AlertEngine::start(
            backends.alerts,
            backends.profiles.clone(),
            provider.clone(),
            backends.push,
            config.alerts.engine_settings(&config.sweep),
        );

        let requests = Arc::new(RequestService::new(
            backends.requests,
            backends.profiles,
            provider,
            engine.clone(),
            config.alerts.request_settings(),
        ));

        Self {
            config: Arc::new(config),
            engine,
            requests,
            locations,
            pool: backends.pool,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let alert_routes = Router::new()
        .route("/api/v1/alerts", post(alerts::create_alert))
        .route("/api/v1/alerts/active", get(alerts::get_active_alert))
        .route("/api/v1/alerts/history", get(alerts::get_alert_history))
        .route("/api/v1/alerts/:alert_id", get(alerts::get_alert))
        .route("/api/v1/alerts/:alert_id/cancel", post(alerts::cancel_alert))
        .route(
            "/api/v1/alerts/:alert_id/arrival",
            post(alerts::confirm_arrival),
        );

    let location_routes = Router::new()
        .route("/api/v1/locations", post(locations::report_position))
        .route(
            "/api/v1/locations/permission",
            put(locations::report_permission),
        );

    let request_routes = Router::new()
        .route("/api/v1/requests", post(requests::send_request))
        .route("/api/v1/requests/pending", get(requests::list_pending))
        .route("/api/v1/requests/sent", get(requests::list_sent))
        .route(
            "/api/v1/requests/:request_id/respond",
            post(requests::respond_to_request),
        );

    let internal_routes = Router::new().route(
        "/api/v1/internal/fallback-sweep",
        post(internal::run_fallback_sweep),
    );

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(alert_routes)
        .merge(location_routes)
        .merge(request_routes)
        .merge(internal_routes)
        // Bottom layers run first
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
