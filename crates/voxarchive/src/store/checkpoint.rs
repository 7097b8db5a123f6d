//! Cursor checkpoint persisted between sync runs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use super::StoreResult;

/// Resume point of the sync loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Cursor of the next page, `None` meaning "from the beginning".
    #[serde(default)]
    pub cursor: Option<String>,
}

impl SyncState {
    pub fn new(cursor: Option<String>) -> Self {
        Self { cursor }
    }
}

/// Reads and writes `sync_state.json`.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last checkpoint.
    ///
    /// A missing or unreadable file yields an empty state.
    pub async fn load(&self) -> SyncState {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SyncState::default(),
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                return SyncState::default();
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Ignoring malformed checkpoint {}: {}",
                    self.path.display(),
                    e
                );
                SyncState::default()
            }
        }
    }

    /// Persist `state`, replacing the previous checkpoint atomically.
    pub async fn save(&self, state: &SyncState) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!("Checkpointed cursor {:?}", state.cursor);
        Ok(())
    }
}
