//! Single-slot supervisor for sync runs.
//!
//! At most one run is active at a time. Start and stop are checked under one
//! lock, so two concurrent start requests never both launch a run.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::engine::{SyncEngine, SyncReport};

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Snapshot for the dashboard and status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub running: bool,
    pub last_run: Option<SyncReport>,
}

struct ActiveRun {
    stop: CancellationToken,
    handle: JoinHandle<()>,
    done: watch::Receiver<bool>,
}

impl ActiveRun {
    fn is_active(&self) -> bool {
        !*self.done.borrow() && !self.handle.is_finished()
    }
}

/// Owns the background sync task.
#[derive(Clone)]
pub struct SyncSupervisor {
    engine: Arc<SyncEngine>,
    slot: Arc<Mutex<Option<ActiveRun>>>,
    last_report: Arc<RwLock<Option<SyncReport>>>,
}

impl SyncSupervisor {
    pub fn new(engine: SyncEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            slot: Arc::new(Mutex::new(None)),
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    /// Launch a run in the background unless one is active.
    pub async fn start(&self) -> StartOutcome {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(ActiveRun::is_active) {
            debug!("Sync already running, ignoring start request");
            return StartOutcome::AlreadyRunning;
        }

        let stop = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        let engine = self.engine.clone();
        let last_report = self.last_report.clone();
        let token = stop.clone();

        let handle = tokio::spawn(async move {
            let report = engine.run(&token).await;
            *last_report.write().await = Some(report);
            let _ = done_tx.send(true);
        });

        info!("Sync started");
        *slot = Some(ActiveRun {
            stop,
            handle,
            done: done_rx,
        });
        StartOutcome::Started
    }

    /// Ask the active run to stop at its next checkpoint.
    ///
    /// Returns whether a run was signalled. Calling it repeatedly is harmless.
    pub async fn stop(&self) -> bool {
        let slot = self.slot.lock().await;
        match slot.as_ref() {
            Some(run) if run.is_active() => {
                if !run.stop.is_cancelled() {
                    info!("Stop requested");
                }
                run.stop.cancel();
                true
            }
            _ => false,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(ActiveRun::is_active)
    }

    pub async fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().await.clone()
    }

    pub async fn status(&self) -> SyncStatus {
        SyncStatus {
            running: self.is_running().await,
            last_run: self.last_report().await,
        }
    }

    /// Wait for the current run, if any, and return the latest report.
    pub async fn wait(&self) -> Option<SyncReport> {
        let done = self.slot.lock().await.as_ref().map(|run| run.done.clone());
        if let Some(mut done) = done {
            // Err means the task went away without reporting.
            let _ = done.wait_for(|finished| *finished).await;
        }
        self.last_report().await
    }

    /// Stop the active run and wait for it to wind down.
    pub async fn shutdown(&self) -> Option<SyncReport> {
        self.stop().await;
        self.wait().await
    }

    /// Issue a start request every `period`, starting one period from now.
    pub fn spawn_scheduler(&self, period: Duration) -> JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if supervisor.start().await == StartOutcome::Started {
                    info!("Scheduled sync started");
                }
            }
        })
    }
}
