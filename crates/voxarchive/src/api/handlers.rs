//! API request handlers.

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse},
};
use serde::Serialize;
use tracing::info;

use super::auth::TokenQuery;
use super::error::ApiResult;
use super::state::AppState;
use crate::sync::{StartOutcome, SyncStatus};
use crate::view::{DashboardView, DayLog, render_dashboard, scan_archive, with_token};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Dashboard page: archived days plus the sync indicator.
pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Html<String>> {
    let days = scan_archive(&state.data_dir).await?;
    let status = state.sync.status().await;

    let html = render_dashboard(&DashboardView {
        days: &days,
        running: status.running,
        last_run: status.last_run.as_ref(),
        token: query.token.as_deref(),
    });
    Ok(Html(html))
}

/// Start a sync in the background and return to the dashboard.
pub async fn start_sync(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> impl IntoResponse {
    if state.sync.start().await == StartOutcome::AlreadyRunning {
        info!("Sync requested while already running");
    }
    back_to_dashboard(query)
}

/// Ask the running sync to stop and return to the dashboard.
pub async fn stop_sync(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> impl IntoResponse {
    state.sync.stop().await;
    back_to_dashboard(query)
}

/// Running flag and last run summary.
pub async fn sync_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.sync.status().await)
}

/// The read model as JSON.
pub async fn archive(State(state): State<AppState>) -> ApiResult<Json<Vec<DayLog>>> {
    Ok(Json(scan_archive(&state.data_dir).await?))
}

/// 302 back to `/`, keeping the token so the next form post still carries it.
fn back_to_dashboard(query: TokenQuery) -> impl IntoResponse {
    let location = with_token("/", query.token.as_deref());
    (StatusCode::FOUND, [(header::LOCATION, location)])
}
