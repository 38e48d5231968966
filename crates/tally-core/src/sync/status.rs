//! Reactive view of the sync engine
//!
//! A single watch channel carries the latest [`SyncStatus`] snapshot;
//! interested parties subscribe and re-render on change. Writers are split
//! by field: the store owns `pending_count`, the network monitor owns
//! `is_online`, and the dispatcher owns the rest.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

/// Where the engine currently is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Pushing,
    Pulling,
    Resolving,
    Error,
}

impl SyncPhase {
    /// True while a cycle is actively running
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pushing | Self::Pulling | Self::Resolving)
    }
}

/// Snapshot of everything the UI needs to show about sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub user_id: String,
    pub is_online: bool,
    pub is_syncing: bool,
    pub phase: SyncPhase,
    /// Operations still waiting in the outbox
    pub pending_count: u64,
    /// When the last clean cycle finished (Unix ms)
    pub last_sync_at: Option<i64>,
    /// Message from the last failed cycle; cleared when a new one starts
    pub error: Option<String>,
}

impl SyncStatus {
    fn initial(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            // Assume connectivity until the monitor says otherwise.
            is_online: true,
            is_syncing: false,
            phase: SyncPhase::Idle,
            pending_count: 0,
            last_sync_at: None,
            error: None,
        }
    }
}

/// Shared handle for publishing and observing [`SyncStatus`]
#[derive(Clone)]
pub struct StatusPublisher {
    tx: Arc<watch::Sender<SyncStatus>>,
}

impl StatusPublisher {
    #[must_use]
    pub fn new(user_id: &str) -> Self {
        let (tx, _rx) = watch::channel(SyncStatus::initial(user_id));
        Self { tx: Arc::new(tx) }
    }

    /// Watch for status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    /// The latest snapshot
    #[must_use]
    pub fn current(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    pub(crate) fn set_pending(&self, count: u64) {
        self.tx.send_modify(|status| status.pending_count = count);
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.tx.send_modify(|status| status.is_online = online);
    }

    pub(crate) fn set_phase(&self, phase: SyncPhase) {
        self.tx.send_modify(|status| {
            status.phase = phase;
            status.is_syncing = phase.is_active();
        });
    }

    /// A new cycle begins: clear the previous error alongside the phase
    pub(crate) fn start_cycle(&self) {
        self.tx.send_modify(|status| {
            status.error = None;
            status.phase = SyncPhase::Pushing;
            status.is_syncing = true;
        });
    }

    pub(crate) fn finish_cycle(&self, last_sync_at: Option<i64>) {
        self.tx.send_modify(|status| {
            status.phase = SyncPhase::Idle;
            status.is_syncing = false;
            if last_sync_at.is_some() {
                status.last_sync_at = last_sync_at;
            }
        });
    }

    pub(crate) fn fail_cycle(&self, message: String) {
        self.tx.send_modify(|status| {
            status.phase = SyncPhase::Error;
            status.is_syncing = false;
            status.error = Some(message);
        });
    }
}
