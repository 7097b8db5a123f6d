//! Remote history types.
//!
//! Mirrors the shapes returned by the voice-chat history API. Unknown fields are
//! preserved so a stored record is a faithful copy of what the remote returned.

mod types;

pub use types::{HistoryItem, HistoryPage, SynthesisRequest, VoiceSettings};
