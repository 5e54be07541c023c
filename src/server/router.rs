use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{get, post},
};

use super::projects;
use crate::cache::SharedCache;
use crate::config::SyncSettings;
use crate::error::Result;
use crate::hosting::http_client;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Holds rate snapshots and project membership shared with other processes.
    pub cache: Arc<dyn SharedCache>,
    pub settings: SyncSettings,
    /// One connection pool for every request's hosting calls.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn SharedCache>,
        settings: SyncSettings,
    ) -> Result<Self> {
        let http = http_client(Duration::from_secs(settings.sync.request_timeout_secs))?;
        Ok(Self {
            store,
            cache,
            settings,
            http,
        })
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

fn project_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects/{id}/sync", post(projects::sync_project))
        .route("/projects/{id}/discover", post(projects::discover_branches))
        .route("/projects/{id}/enrich", post(projects::enrich_commits))
        .route("/projects/{id}/quota", get(projects::quota_status))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", project_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
