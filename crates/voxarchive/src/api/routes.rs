//! API route definitions.

use axum::{
    Router,
    body::Body,
    http::Request,
    middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, Span};

use super::auth::require_control_token;
use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(request_span)
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Start/stop change state and sit behind the optional control token
    let control_routes = Router::new()
        .route("/sync", post(handlers::start_sync))
        .route("/stop", post(handlers::stop_sync))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_control_token,
        ));

    let public_routes = Router::new()
        .route("/", get(handlers::dashboard))
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::sync_status))
        .route("/api/archive", get(handlers::archive))
        .nest_service("/data", ServeDir::new(&state.data_dir));

    Router::new()
        .merge(public_routes)
        .merge(control_routes)
        .layer(trace_layer)
        .with_state(state)
}

/// Request span with method and path only; the query may carry the control token.
fn request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path()
    )
}
