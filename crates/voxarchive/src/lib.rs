//! voxarchive: mirrors ElevenLabs history into a dated local archive and
//! serves it as a browsable dashboard.

pub mod api;
pub mod client;
pub mod config;
pub mod history;
pub mod store;
pub mod sync;
pub mod view;
