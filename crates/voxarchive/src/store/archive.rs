//! Idempotent per-message persistence.

use serde_json::Value;
use tokio::fs;
use tracing::{debug, error, info, warn};

use super::layout::{ArchiveLayout, ItemPaths};
use super::{StoreError, StoreResult};
use crate::client::HistoryClient;
use crate::history::{HistoryItem, SynthesisRequest};

/// What happened to an item handed to [`ArchiveStore::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A record already existed at the derived path; nothing was done.
    AlreadySaved,
    /// The record was written.
    Saved { audio: AudioOutcome },
    /// Writing failed; the error was logged.
    Failed { reason: String },
}

/// Audio result for a newly written record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioOutcome {
    /// The item lacks text or voice id.
    NotApplicable,
    /// An audio file was already on disk.
    AlreadyPresent,
    /// Synthesized and written.
    Written,
    /// Synthesis did not return audio. Not retried on later syncs.
    Missing { reason: String },
}

/// Writes history items into the archive layout.
#[derive(Clone)]
pub struct ArchiveStore {
    layout: ArchiveLayout,
    client: HistoryClient,
}

impl ArchiveStore {
    pub fn new(layout: ArchiveLayout, client: HistoryClient) -> Self {
        Self { layout, client }
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    /// Decode one raw page entry and persist it.
    ///
    /// An entry that does not decode is reported as [`SaveOutcome::Failed`],
    /// like any other per-item error.
    pub async fn save_raw(&self, raw: &Value) -> SaveOutcome {
        match HistoryItem::from_value(raw) {
            Ok(item) => self.save(&item).await,
            Err(e) => {
                error!(
                    "Malformed history item {}: {}",
                    raw.get("history_item_id").unwrap_or(&serde_json::Value::Null),
                    e
                );
                SaveOutcome::Failed {
                    reason: format!("malformed history item: {e}"),
                }
            }
        }
    }

    /// Persist `item` and its audio.
    ///
    /// Never fails: errors are logged and reported as [`SaveOutcome::Failed`]
    /// so one bad item cannot abort a sync.
    pub async fn save(&self, item: &HistoryItem) -> SaveOutcome {
        match self.try_save(item).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "Save error for item {:?} ({:?}): {}",
                    item.history_item_id, item.date_unix, e
                );
                SaveOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_save(&self, item: &HistoryItem) -> StoreResult<SaveOutcome> {
        let at = item
            .timestamp()
            .ok_or(StoreError::InvalidTimestamp(item.date_unix.unwrap_or_default()))?;
        let paths = self.layout.paths_for(item, at);

        fs::create_dir_all(&paths.chat_dir).await?;
        fs::create_dir_all(&paths.voice_dir).await?;

        if fs::try_exists(&paths.record).await? {
            debug!("Already saved: {}", paths.record.display());
            return Ok(SaveOutcome::AlreadySaved);
        }

        let record = serde_json::to_vec_pretty(item)?;
        fs::write(&paths.record, record).await?;
        info!("Saved {}", paths.record.display());

        let audio = self.save_audio(item, &paths).await?;
        Ok(SaveOutcome::Saved { audio })
    }

    async fn save_audio(&self, item: &HistoryItem, paths: &ItemPaths) -> StoreResult<AudioOutcome> {
        let Some((text, voice_id)) = item.speakable() else {
            return Ok(AudioOutcome::NotApplicable);
        };

        if fs::try_exists(&paths.audio).await? {
            return Ok(AudioOutcome::AlreadyPresent);
        }

        let request = SynthesisRequest::new(text, &item.effective_settings());
        match self.client.synthesize(voice_id, &request).await {
            Ok(audio) => {
                fs::write(&paths.audio, &audio).await?;
                info!("Saved {} ({} bytes)", paths.audio.display(), audio.len());
                Ok(AudioOutcome::Written)
            }
            Err(e) => {
                warn!(
                    "No audio for {} (voice {}): {}",
                    paths.record.display(),
                    voice_id,
                    e
                );
                Ok(AudioOutcome::Missing {
                    reason: e.to_string(),
                })
            }
        }
    }
}
