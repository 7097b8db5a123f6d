//! Fetch client error types.

use thiserror::Error;

/// Result type for fetch client operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors a single transport attempt can produce.
///
/// Every variant is retried by [`super::HistoryClient::request`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request timed out.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Could not connect to the remote.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other failure while sending the request or reading the body.
    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Errors surfaced to callers of the fetch client.
///
/// Non-429 HTTP statuses are not errors here; they come back as responses.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Downloads are disabled; no request was made.
    #[error("downloads are disabled")]
    Disabled,

    /// Every attempt was rate limited or failed at the transport level.
    #[error("gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// Failed to build the request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Response body did not match the expected shape.
    #[error("failed to parse response: {0}")]
    ParseError(String),

    /// Remote answered with a status the caller cannot use.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}
