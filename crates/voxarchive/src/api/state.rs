//! Application state shared across handlers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::sync::SyncSupervisor;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Background sync owner.
    pub sync: SyncSupervisor,
    /// Archive root served under `/data` and scanned by the dashboard.
    pub data_dir: PathBuf,
    /// When set, start/stop require this token.
    pub control_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(sync: SyncSupervisor, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            sync,
            data_dir: data_dir.into(),
            control_token: None,
        }
    }

    pub fn with_control_token(mut self, token: Option<String>) -> Self {
        self.control_token = token.filter(|t| !t.is_empty()).map(Arc::from);
        self
    }
}
