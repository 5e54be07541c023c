use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;

use crate::hosting::GitHubTransport;
use crate::scheduler::Scheduler;
use crate::server::AppState;
use crate::server::credential::HostingCredential;
use crate::server::dto::SyncParams;
use crate::server::response::{ApiError, ApiResponse, ResultExt};

fn scheduler(
    state: &AppState,
    HostingCredential(credential): HostingCredential,
) -> Scheduler<GitHubTransport> {
    Scheduler::github_with_client(
        state.store.clone(),
        state.cache.clone(),
        credential,
        state.settings.clone(),
        state.http.clone(),
    )
}

pub async fn sync_project(
    credential: HostingCredential,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<SyncParams>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduler = scheduler(&state, credential);
    let report = scheduler.run(&id, params.branch.as_deref()).await.api()?;
    Ok(ApiResponse::success(report))
}

pub async fn discover_branches(
    credential: HostingCredential,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduler = scheduler(&state, credential);
    let report = scheduler.discover(&id).await.api()?;
    Ok(ApiResponse::success(report))
}

pub async fn enrich_commits(
    credential: HostingCredential,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduler = scheduler(&state, credential);
    let report = scheduler.enrich(&id).await.api()?;
    Ok(ApiResponse::success(report))
}

pub async fn quota_status(
    credential: HostingCredential,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduler = scheduler(&state, credential);
    let status = scheduler.quota_status(&id).api()?;
    Ok(ApiResponse::success(status))
}
