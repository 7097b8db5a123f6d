//! HTTP API module.
//!
//! Serves the dashboard, the start/stop control surface and the archived files.

mod auth;
mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
