//! Control token check for the start/stop routes.

use axum::{
    extract::{Query, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::error::ApiError;
use super::state::AppState;

/// `?token=` query parameter.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Reject the request unless it carries the configured control token.
///
/// Accepts `Authorization: Bearer <token>`, or `?token=<token>` for the
/// dashboard forms, which cannot set headers. Passes everything through when no
/// token is configured.
pub async fn require_control_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.control_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let bearer = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let query = Query::<TokenQuery>::try_from_uri(req.uri())
        .map(|Query(q)| q.token)
        .unwrap_or_default();

    let presented = bearer.or(query);
    if presented.is_some_and(|token| tokens_match(&token, expected)) {
        Ok(next.run(req).await)
    } else {
        Err(ApiError::unauthorized("missing or invalid control token"))
    }
}

/// Compare tokens in time independent of where they differ.
///
/// Both sides are hashed first so their lengths do not leak either.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
