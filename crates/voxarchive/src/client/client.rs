//! Rate-limited client for the voice-chat history API.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{StatusCode, Url};
use tracing::{debug, info, warn};

use super::error::{FetchError, FetchResult};
use super::transport::{HttpResponse, OutboundRequest, Transport};
use crate::history::{HistoryPage, SynthesisRequest};

/// Settings for [`HistoryClient`].
#[derive(Debug, Clone)]
pub struct HistoryClientConfig {
    /// API root, e.g. `https://api.elevenlabs.io/v1`.
    pub base_url: String,
    /// When set, no request ever reaches the transport.
    pub disabled: bool,
    /// Attempts per call before giving up.
    pub retries: u32,
    /// Backoff after attempt `n` is `backoff_unit * 2^n`.
    pub backoff_unit: Duration,
    /// `page_size` sent to the history endpoint.
    pub page_size: u32,
}

impl Default for HistoryClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            disabled: false,
            retries: 3,
            backoff_unit: Duration::from_secs(1),
            page_size: 100,
        }
    }
}

/// Client that retries rate-limited and failed attempts with exponential backoff.
#[derive(Clone)]
pub struct HistoryClient {
    transport: Arc<dyn Transport>,
    config: HistoryClientConfig,
}

impl HistoryClient {
    pub fn new(transport: Arc<dyn Transport>, config: HistoryClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &HistoryClientConfig {
        &self.config
    }

    pub fn is_disabled(&self) -> bool {
        self.config.disabled
    }

    /// Delay slept after a failed attempt (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.config
            .backoff_unit
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Send a request, retrying on 429 and transport errors.
    ///
    /// Any other status is returned as-is on the first attempt that produces it.
    pub async fn request(&self, request: &OutboundRequest, retries: u32) -> FetchResult<HttpResponse> {
        if self.config.disabled {
            info!("[disabled] {} {}", request.method, request.url);
            return Err(FetchError::Disabled);
        }

        let mut last = String::from("no attempts made");
        for attempt in 0..retries {
            match self.transport.send(request).await {
                Ok(response) if response.status == StatusCode::TOO_MANY_REQUESTS => {
                    warn!(
                        "{} {} rate limited (attempt {}/{})",
                        request.method,
                        request.url,
                        attempt + 1,
                        retries
                    );
                    last = "rate limited (429)".to_string();
                }
                Ok(response) => {
                    debug!("{} {} -> {}", request.method, request.url, response.status);
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        "{} {} failed (attempt {}/{}): {}",
                        request.method,
                        request.url,
                        attempt + 1,
                        retries,
                        e
                    );
                    last = e.to_string();
                }
            }

            if attempt + 1 < retries {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
        }

        Err(FetchError::RetriesExhausted {
            attempts: retries,
            last,
        })
    }

    /// Fetch one page of history starting at `cursor`.
    pub async fn fetch_history_page(&self, cursor: Option<&str>) -> FetchResult<HistoryPage> {
        let mut request = OutboundRequest::get(self.endpoint(&["history"])?)
            .query("page_size", self.config.page_size.to_string());
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            request = request.query("cursor", cursor);
        }

        let response = self.request(&request, self.config.retries).await?;
        if !response.is_ok() {
            return Err(FetchError::UnexpectedStatus {
                status: response.status.as_u16(),
                body: response.text_lossy(),
            });
        }
        response.json()
    }

    /// Synthesize speech for `voice_id`, returning the audio bytes on 200.
    pub async fn synthesize(&self, voice_id: &str, body: &SynthesisRequest) -> FetchResult<Bytes> {
        let json = serde_json::to_value(body)
            .map_err(|e| FetchError::InvalidRequest(format!("encoding synthesis body: {e}")))?;
        let request = OutboundRequest::post(self.endpoint(&["text-to-speech", voice_id])?).json(json);

        let response = self.request(&request, self.config.retries).await?;
        if !response.is_ok() {
            return Err(FetchError::UnexpectedStatus {
                status: response.status.as_u16(),
                body: response.text_lossy(),
            });
        }
        Ok(response.body)
    }

    /// Join path segments onto the base URL, escaping each segment.
    fn endpoint(&self, segments: &[&str]) -> FetchResult<String> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| FetchError::InvalidRequest(format!("invalid base URL: {e}")))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| FetchError::InvalidRequest("base URL cannot have a path".into()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::client::TransportError;

    type Scripted = Result<HttpResponse, TransportError>;

    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Scripted>>,
        seen: Mutex<Vec<OutboundRequest>>,
    }

    impl ScriptedTransport {
        fn with(replies: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &OutboundRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(StatusCode::OK, "{}")))
        }
    }

    fn rate_limited() -> Scripted {
        Ok(HttpResponse::new(StatusCode::TOO_MANY_REQUESTS, ""))
    }

    fn client(transport: Arc<ScriptedTransport>) -> HistoryClient {
        HistoryClient::new(
            transport,
            HistoryClientConfig {
                base_url: "http://remote.test/v1".to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let client = client(ScriptedTransport::with(vec![]));
        assert_eq!(client.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(client.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(client.backoff_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let client = client(ScriptedTransport::with(vec![]));
        assert_eq!(
            client.endpoint(&["text-to-speech", "a/b"]).unwrap(),
            "http://remote.test/v1/text-to-speech/a%2Fb"
        );
    }

    #[tokio::test]
    async fn test_disabled_makes_no_calls() {
        let transport = ScriptedTransport::with(vec![]);
        let client = HistoryClient::new(
            transport.clone(),
            HistoryClientConfig {
                disabled: true,
                ..Default::default()
            },
        );

        let result = client.request(&OutboundRequest::get("http://x"), 3).await;
        assert!(matches!(result, Err(FetchError::Disabled)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backoff_sums() {
        let transport = ScriptedTransport::with(vec![
            rate_limited(),
            rate_limited(),
            Ok(HttpResponse::new(StatusCode::OK, "done")),
        ]);
        let client = client(transport.clone());

        let started = Instant::now();
        let response = client
            .request(&OutboundRequest::get("http://x"), 5)
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(response.body, Bytes::from("done"));
        assert_eq!(transport.calls(), 3);
        // 2^0 + 2^1 units
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_ceiling() {
        let transport = ScriptedTransport::with(vec![
            rate_limited(),
            Err(TransportError::Timeout("slow".into())),
            rate_limited(),
            Ok(HttpResponse::new(StatusCode::OK, "never reached")),
        ]);
        let client = client(transport.clone());

        let result = client.request(&OutboundRequest::get("http://x"), 3).await;
        match result {
            Err(FetchError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "rate limited (429)");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_non_429_errors_are_not_retried() {
        let transport = ScriptedTransport::with(vec![
            Ok(HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom")),
            Ok(HttpResponse::new(StatusCode::OK, "{}")),
        ]);
        let client = client(transport.clone());

        let response = client
            .request(&OutboundRequest::get("http://x"), 3)
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_history_page_query() {
        let transport = ScriptedTransport::with(vec![
            Ok(HttpResponse::new(StatusCode::OK, r#"{"history": [], "has_more": false}"#)),
            Ok(HttpResponse::new(StatusCode::OK, r#"{"history": [], "has_more": false}"#)),
        ]);
        let client = client(transport.clone());

        client.fetch_history_page(None).await.unwrap();
        client.fetch_history_page(Some("abc")).await.unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].url, "http://remote.test/v1/history");
        assert_eq!(seen[0].query_value("page_size"), Some("100"));
        assert_eq!(seen[0].query_value("cursor"), None);
        assert_eq!(seen[1].query_value("cursor"), Some("abc"));
    }

    #[tokio::test]
    async fn test_history_page_non_200() {
        let transport = ScriptedTransport::with(vec![Ok(HttpResponse::new(
            StatusCode::UNAUTHORIZED,
            "bad key",
        ))]);
        let client = client(transport);

        let result = client.fetch_history_page(None).await;
        assert!(matches!(
            result,
            Err(FetchError::UnexpectedStatus { status: 401, .. })
        ));
    }
}
