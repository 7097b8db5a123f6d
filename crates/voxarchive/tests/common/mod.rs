//! Test utilities: a scripted remote and engine/app builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use voxarchive::api::{self, AppState};
use voxarchive::client::{
    HistoryClient, HistoryClientConfig, HttpResponse, OutboundRequest, Transport, TransportError,
};
use voxarchive::store::{ArchiveLayout, ArchiveStore, CollisionPolicy, CursorStore};
use voxarchive::sync::{SyncEngine, SyncSupervisor};

pub const BASE_URL: &str = "http://remote.test/v1";
pub const AUDIO_BYTES: &[u8] = b"ID3-fake-mp3";

/// 2023-11-14T22:13:20Z.
pub const T0: i64 = 1_700_000_000;

/// Stand-in for the remote API.
///
/// `/history` replies come from a queue (an empty final page once it runs
/// dry). Synthesis always answers with [`AUDIO_BYTES`] unless told otherwise.
#[derive(Default)]
pub struct FakeRemote {
    history: Mutex<VecDeque<HttpResponse>>,
    synth_status: Mutex<Option<StatusCode>>,
    requests: Mutex<Vec<OutboundRequest>>,
    cancel_on_synth: Mutex<Option<CancellationToken>>,
    synth_gate: Mutex<Option<Arc<Semaphore>>>,
    pub synth_entered: Arc<Notify>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_history(&self, response: HttpResponse) {
        self.history.lock().unwrap().push_back(response);
    }

    pub fn push_page(&self, items: Vec<Value>, next_cursor: Option<&str>, has_more: bool) {
        self.push_history(page(items, next_cursor, has_more));
    }

    pub fn fail_synthesis(&self, status: StatusCode) {
        *self.synth_status.lock().unwrap() = Some(status);
    }

    /// Cancel `token` while the first synthesis request is in flight.
    pub fn cancel_during_first_synthesis(&self, token: CancellationToken) {
        *self.cancel_on_synth.lock().unwrap() = Some(token);
    }

    /// Hold every synthesis request until a permit is added to the returned gate.
    pub fn gate_synthesis(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.synth_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn history_requests(&self) -> Vec<OutboundRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.ends_with("/history"))
            .collect()
    }

    pub fn synth_requests(&self) -> Vec<OutboundRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.contains("/text-to-speech/"))
            .collect()
    }

    async fn synthesize(&self) -> HttpResponse {
        self.synth_entered.notify_one();
        if let Some(token) = self.cancel_on_synth.lock().unwrap().take() {
            token.cancel();
        }
        let gate = self.synth_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        match *self.synth_status.lock().unwrap() {
            Some(status) => HttpResponse::new(status, "synthesis failed"),
            None => HttpResponse::new(StatusCode::OK, AUDIO_BYTES),
        }
    }
}

#[async_trait]
impl Transport for FakeRemote {
    async fn send(&self, request: &OutboundRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if request.url.ends_with("/history") {
            let next = self.history.lock().unwrap().pop_front();
            return Ok(next.unwrap_or_else(|| page(vec![], None, false)));
        }
        if request.url.contains("/text-to-speech/") {
            return Ok(self.synthesize().await);
        }
        Ok(HttpResponse::new(StatusCode::NOT_FOUND, "unknown route"))
    }
}

/// One history item with text and a voice.
pub fn item(id: &str, date_unix: i64, text: &str) -> Value {
    json!({
        "history_item_id": id,
        "date_unix": date_unix,
        "voice_id": "voice-1",
        "voice_name": "Rachel",
        "text": text,
        "settings": { "stability": 0.4, "similarity_boost": 0.8 }
    })
}

pub fn page(items: Vec<Value>, next_cursor: Option<&str>, has_more: bool) -> HttpResponse {
    let body = json!({
        "history": items,
        "next_cursor": next_cursor,
        "has_more": has_more,
    });
    HttpResponse::new(StatusCode::OK, body.to_string())
}

pub fn client(remote: Arc<FakeRemote>, disabled: bool) -> HistoryClient {
    HistoryClient::new(
        remote,
        HistoryClientConfig {
            base_url: BASE_URL.to_string(),
            disabled,
            retries: 3,
            backoff_unit: Duration::from_millis(1),
            page_size: 100,
        },
    )
}

pub fn engine(remote: Arc<FakeRemote>, root: &Path) -> SyncEngine {
    engine_with(remote, root, false, CollisionPolicy::Timestamp)
}

pub fn engine_with(
    remote: Arc<FakeRemote>,
    root: &Path,
    disabled: bool,
    policy: CollisionPolicy,
) -> SyncEngine {
    let client = client(remote, disabled);
    let layout = ArchiveLayout::new(root, policy);
    let cursor = CursorStore::new(layout.state_file());
    let store = ArchiveStore::new(layout, client.clone());
    SyncEngine::new(client, store, cursor)
}

/// Router over a fresh supervisor, plus the supervisor for assertions.
pub fn test_app(
    remote: Arc<FakeRemote>,
    root: &Path,
    control_token: Option<&str>,
) -> (Router, SyncSupervisor) {
    let supervisor = SyncSupervisor::new(engine(remote, root));
    let state = AppState::new(supervisor.clone(), root)
        .with_control_token(control_token.map(str::to_string));
    (api::create_router(state), supervisor)
}

pub fn record_path(root: &Path, date: &str, stem: &str) -> std::path::PathBuf {
    root.join(date).join("chat").join(format!("{stem}.json"))
}

pub fn audio_path(root: &Path, date: &str, stem: &str) -> std::path::PathBuf {
    root.join(date).join("voice").join(format!("{stem}.mp3"))
}

/// Parsed `sync_state.json`, or `None` when no checkpoint was written.
pub fn checkpoint(root: &Path) -> Option<Value> {
    let body = std::fs::read_to_string(root.join("sync_state.json")).ok()?;
    Some(serde_json::from_str(&body).unwrap())
}
