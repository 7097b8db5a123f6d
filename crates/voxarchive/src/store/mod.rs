//! Persistence store.
//!
//! Provides:
//! - The date-based directory layout shared with the dashboard
//! - Idempotent message and audio writes
//! - The cursor checkpoint file

mod archive;
mod checkpoint;
mod error;
mod layout;

pub use archive::{ArchiveStore, AudioOutcome, SaveOutcome};
pub use checkpoint::{CursorStore, SyncState};
pub use error::{StoreError, StoreResult};
pub use layout::{
    AUDIO_EXT, ArchiveLayout, CHAT_DIR, CollisionPolicy, ItemPaths, RECORD_EXT, STATE_FILE,
    VOICE_DIR, stem_for,
};
