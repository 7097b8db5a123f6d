//! Incremental history sync.
//!
//! One run walks the remote history page by page from the last checkpointed
//! cursor, saves every item and checkpoints the next cursor after each page.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::client::HistoryClient;
use crate::store::{ArchiveStore, AudioOutcome, CursorStore, SaveOutcome, SyncState};

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The remote reported no further pages.
    Completed,
    /// The remote returned an empty page.
    UpToDate,
    /// A stop was requested.
    Stopped,
    /// Downloads are disabled; nothing was fetched.
    Disabled,
    /// A history page could not be fetched. The checkpoint is unchanged.
    FetchFailed { reason: String },
    /// The cursor could not be written after a page.
    CheckpointFailed { reason: String },
}

impl SyncOutcome {
    /// Whether the run ended because of an error.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SyncOutcome::FetchFailed { .. } | SyncOutcome::CheckpointFailed { .. }
        )
    }
}

/// Summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Pages fetched successfully.
    pub pages: u32,
    /// Records newly written.
    pub saved: u32,
    /// Items whose record already existed.
    pub skipped: u32,
    /// Items that could not be written.
    pub failed: u32,
    /// Audio files written.
    pub audio_written: u32,
    /// Checkpoint writes.
    pub checkpoints: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RunStats {
    pages: u32,
    saved: u32,
    skipped: u32,
    failed: u32,
    audio_written: u32,
    checkpoints: u32,
}

impl RunStats {
    fn record(&mut self, outcome: &SaveOutcome) {
        match outcome {
            SaveOutcome::AlreadySaved => self.skipped += 1,
            SaveOutcome::Saved { audio } => {
                self.saved += 1;
                if *audio == AudioOutcome::Written {
                    self.audio_written += 1;
                }
            }
            SaveOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Drives pagination, persistence and checkpointing.
pub struct SyncEngine {
    client: HistoryClient,
    store: ArchiveStore,
    cursor: CursorStore,
}

impl SyncEngine {
    pub fn new(client: HistoryClient, store: ArchiveStore, cursor: CursorStore) -> Self {
        Self {
            client,
            store,
            cursor,
        }
    }

    pub fn cursor_store(&self) -> &CursorStore {
        &self.cursor
    }

    /// Run until the remote is exhausted, a fetch fails or `stop` is cancelled.
    ///
    /// Cancellation is checked before each page and before each item; an item
    /// already being saved runs to completion. A page interrupted by a stop is
    /// not checkpointed.
    pub async fn run(&self, stop: &CancellationToken) -> SyncReport {
        let started_at = Utc::now();
        let mut stats = RunStats::default();

        let outcome = self.run_pages(stop, &mut stats).await;
        match &outcome {
            SyncOutcome::FetchFailed { reason } | SyncOutcome::CheckpointFailed { reason } => {
                error!("Sync aborted: {}", reason)
            }
            other => info!(
                "Sync completed ({:?}): {} saved, {} skipped, {} failed, {} page(s)",
                other, stats.saved, stats.skipped, stats.failed, stats.pages
            ),
        }

        SyncReport {
            outcome,
            pages: stats.pages,
            saved: stats.saved,
            skipped: stats.skipped,
            failed: stats.failed,
            audio_written: stats.audio_written,
            checkpoints: stats.checkpoints,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn run_pages(&self, stop: &CancellationToken, stats: &mut RunStats) -> SyncOutcome {
        if self.client.is_disabled() {
            info!("Downloads disabled, skipping sync");
            return SyncOutcome::Disabled;
        }

        let mut cursor = self.cursor.load().await.cursor;
        info!("Starting sync from cursor {:?}", cursor);

        loop {
            if stop.is_cancelled() {
                return SyncOutcome::Stopped;
            }

            let page = match self.client.fetch_history_page(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    return SyncOutcome::FetchFailed {
                        reason: format!("failed to fetch history: {e}"),
                    };
                }
            };
            stats.pages += 1;

            if page.history.is_empty() {
                info!("No more history");
                return SyncOutcome::UpToDate;
            }

            for raw in &page.history {
                if stop.is_cancelled() {
                    info!("Stop requested, leaving page unfinished");
                    return SyncOutcome::Stopped;
                }
                let outcome = self.store.save_raw(raw).await;
                stats.record(&outcome);
                tokio::task::yield_now().await;
            }

            let state = SyncState::new(page.next_cursor.clone());
            if let Err(e) = self.cursor.save(&state).await {
                return SyncOutcome::CheckpointFailed {
                    reason: format!("failed to write {}: {e}", self.cursor.path().display()),
                };
            }
            stats.checkpoints += 1;

            if !page.has_more {
                return SyncOutcome::Completed;
            }
            if page.next_cursor.is_none() {
                warn!("Remote reported more pages without a cursor; restarting from the beginning");
            }
            cursor = page.next_cursor;
        }
    }
}
