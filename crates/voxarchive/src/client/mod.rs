//! Rate-limited fetch client.
//!
//! Wraps calls to the history and synthesis endpoints with retry and
//! exponential backoff, plus a kill-switch for offline environments.

mod client;
mod error;
mod transport;

pub use client::{HistoryClient, HistoryClientConfig};
pub use error::{FetchError, FetchResult, TransportError};
pub use transport::{API_KEY_HEADER, HttpResponse, OutboundRequest, ReqwestTransport, Transport};
