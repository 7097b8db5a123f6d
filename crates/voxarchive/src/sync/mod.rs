//! Sync engine and its supervisor.

mod engine;
mod supervisor;

pub use engine::{SyncEngine, SyncOutcome, SyncReport};
pub use supervisor::{StartOutcome, SyncStatus, SyncSupervisor};
