//! On-disk layout of the archive.
//!
//! ```text
//! <root>/<YYYY-MM-DD>/chat/<stem>.json
//! <root>/<YYYY-MM-DD>/voice/<stem>.mp3
//! <root>/sync_state.json
//! ```
//!
//! The dashboard reads this layout directly, so it must stay stable.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::history::HistoryItem;

pub const CHAT_DIR: &str = "chat";
pub const VOICE_DIR: &str = "voice";
pub const RECORD_EXT: &str = "json";
pub const AUDIO_EXT: &str = "mp3";
pub const STATE_FILE: &str = "sync_state.json";

/// How the filename stem of a message is derived.
///
/// With `Timestamp`, two items in the same second map to the same file and the
/// later one is dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// `HH-MM-SS`.
    #[default]
    Timestamp,
    /// `HH-MM-SS-<8 hex chars of a content hash>`.
    ContentHash,
    /// `HH-MM-SS-<remote id>`, or `HH-MM-SS` when the item has no id.
    RemoteId,
}

/// Paths for a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPaths {
    pub date: String,
    pub stem: String,
    pub chat_dir: PathBuf,
    pub voice_dir: PathBuf,
    pub record: PathBuf,
    pub audio: PathBuf,
}

/// Maps items to locations under the archive root.
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
    policy: CollisionPolicy,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>, policy: CollisionPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    /// Location of the cursor checkpoint.
    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Paths for `item`, dated at `at` (UTC).
    pub fn paths_for(&self, item: &HistoryItem, at: DateTime<Utc>) -> ItemPaths {
        let date = at.format("%Y-%m-%d").to_string();
        let stem = stem_for(item, at, self.policy);
        let day = self.root.join(&date);
        let chat_dir = day.join(CHAT_DIR);
        let voice_dir = day.join(VOICE_DIR);

        ItemPaths {
            record: chat_dir.join(format!("{stem}.{RECORD_EXT}")),
            audio: voice_dir.join(format!("{stem}.{AUDIO_EXT}")),
            date,
            stem,
            chat_dir,
            voice_dir,
        }
    }
}

/// Filename stem for `item` under `policy`.
pub fn stem_for(item: &HistoryItem, at: DateTime<Utc>, policy: CollisionPolicy) -> String {
    let time = at.format("%H-%M-%S").to_string();
    match policy {
        CollisionPolicy::Timestamp => time,
        CollisionPolicy::ContentHash => format!("{time}-{}", content_hash(item)),
        CollisionPolicy::RemoteId => match item.history_item_id.as_deref().map(sanitize_id) {
            Some(id) if !id.is_empty() => format!("{time}-{id}"),
            _ => time,
        },
    }
}

/// First 8 hex chars of sha256 over text, voice id and timestamp.
fn content_hash(item: &HistoryItem) -> String {
    let mut hasher = Sha256::new();
    hasher.update(item.text.as_deref().unwrap_or_default().as_bytes());
    hasher.update([0u8]);
    hasher.update(item.voice_id.as_deref().unwrap_or_default().as_bytes());
    hasher.update([0u8]);
    if let Some(ts) = item.date_unix {
        hasher.update(ts.to_le_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    digest[..8].to_string()
}

/// Keep only characters that are safe in a filename.
fn sanitize_id(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}
