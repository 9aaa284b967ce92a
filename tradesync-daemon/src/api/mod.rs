//! HTTP API consumed by the dashboard and the `tradesync` CLI.

pub mod error;
pub mod handlers;
pub mod requests;
pub mod responses;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tradesync_core::config::OdooConfig;
use tradesync_core::{MappingStore, RunLog};
use tradesync_sync::{CollaboratorError, Erp, JobQueue};

use crate::workers::WorkerStats;

/// Builds an ERP client from ad-hoc credentials (used by `test-odoo`).
pub type ErpConnector =
    Arc<dyn Fn(OdooConfig) -> Result<Arc<dyn Erp>, CollaboratorError> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub mappings: Arc<MappingStore>,
    pub run_log: Arc<RunLog>,
    pub queue: Arc<JobQueue>,
    pub workers: Arc<WorkerStats>,
    pub worker_pool_size: usize,
    pub erp_connector: ErpConnector,
    pub call_timeout: Duration,
}

/// Router with every endpoint, each also reachable with a trailing slash.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let mut router = Router::new();
    for path in ["/health", "/health/"] {
        router = router.route(path, get(handlers::health));
    }
    for path in ["/logs", "/logs/"] {
        router = router.route(path, get(handlers::list_logs));
    }
    for path in ["/mappings", "/mappings/"] {
        router = router.route(
            path,
            get(handlers::list_mappings).post(handlers::upsert_mapping),
        );
    }
    for path in ["/sync/trigger", "/sync/trigger/"] {
        router = router.route(path, post(handlers::trigger_sync));
    }
    for path in ["/jobs/:id", "/jobs/:id/"] {
        router = router.route(path, get(handlers::get_job));
    }
    for path in ["/jobs/:id/cancel", "/jobs/:id/cancel/"] {
        router = router.route(path, post(handlers::cancel_job));
    }
    for path in ["/config/test-odoo", "/config/test-odoo/"] {
        router = router.route(path, post(handlers::test_odoo));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
