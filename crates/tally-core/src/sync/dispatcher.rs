//! Sync cycle orchestration
//!
//! A cycle runs push, pull, resolve, in that order, and never overlaps
//! with another cycle on the same dispatcher. Push drains the outbox in
//! enqueue order, holding back every operation queued behind a failure for
//! the same record; pull fetches remote changes after the stored cursor
//! and resolves each record independently. Transport failures end the
//! cycle in the error state and leave the outbox intact for the next run.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::{self, Store};
use crate::error::{Error, Result};
use crate::models::{Entity, RecordId};
use crate::sync::backend::{PullResponse, PullScope, RemoteBackend};
use crate::sync::resolver::{self, Resolution};
use crate::sync::status::{StatusPublisher, SyncPhase};
use crate::sync::NetworkMonitor;

/// Tuning knobs for the dispatcher
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Most operations sent per push request
    pub push_batch: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { push_batch: 50 }
    }
}

/// What one cycle accomplished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Operations acknowledged and removed from the outbox
    pub pushed: usize,
    /// Operations that failed and were rescheduled
    pub push_failures: usize,
    /// Records received from the backend
    pub pulled: usize,
    /// Received records that won against the local copy
    pub applied: usize,
}

/// Runs sync cycles against one store and one backend
pub struct SyncDispatcher {
    store: Arc<Store>,
    backend: Arc<dyn RemoteBackend>,
    monitor: Arc<NetworkMonitor>,
    status: StatusPublisher,
    options: SyncOptions,
    in_flight: AtomicBool,
}

impl SyncDispatcher {
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        backend: Arc<dyn RemoteBackend>,
        monitor: Arc<NetworkMonitor>,
        status: StatusPublisher,
    ) -> Self {
        Self::with_options(store, backend, monitor, status, SyncOptions::default())
    }

    #[must_use]
    pub fn with_options(
        store: Arc<Store>,
        backend: Arc<dyn RemoteBackend>,
        monitor: Arc<NetworkMonitor>,
        status: StatusPublisher,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            backend,
            monitor,
            status,
            options,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one full sync cycle
    ///
    /// Returns `Ok(None)` when the cycle was skipped because the device is
    /// offline or another cycle is already in flight. A transport failure
    /// returns the error after publishing it on the status channel; queued
    /// operations stay put for the next cycle.
    pub async fn sync(&self) -> Result<Option<SyncReport>> {
        if !self.monitor.is_online() {
            debug!("Skipping sync while offline");
            return Ok(None);
        }
        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            debug!("Sync already in flight");
            return Ok(None);
        };

        self.status.start_cycle();
        match self.run_cycle().await {
            Ok(report) => {
                let finished_at = self.store.now_ms();
                self.store.set_last_sync_at(finished_at)?;
                self.status.finish_cycle(Some(finished_at));
                info!(
                    pushed = report.pushed,
                    push_failures = report.push_failures,
                    pulled = report.pulled,
                    applied = report.applied,
                    "Sync cycle complete"
                );
                Ok(Some(report))
            }
            Err(e) => {
                self.status.fail_cycle(e.to_string());
                Err(e)
            }
        }
    }

    /// Privileged pull of every tenant's records
    ///
    /// Applies the usual conflict rules locally but touches neither the
    /// outbox nor pending local operations, so interrupted or queued work
    /// survives an administrative refresh.
    pub async fn force_pull(&self) -> Result<SyncReport> {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            return Err(Error::InvalidInput(
                "A sync cycle is already in flight".to_string(),
            ));
        };

        self.status.start_cycle();
        let outcome = self.run_force_pull().await;
        match outcome {
            Ok(report) => {
                self.status.finish_cycle(None);
                info!(applied = report.applied, "Force pull complete");
                Ok(report)
            }
            Err(e) => {
                self.status.fail_cycle(e.to_string());
                Err(e)
            }
        }
    }

    /// Fetch shared configuration and overwrite the local cache
    ///
    /// One-way: the local cache never pushes anything back.
    pub async fn sync_global_data(&self) -> Result<usize> {
        let entries = self.backend.global_config().await?;
        self.store.replace_global_config(&entries)?;
        info!(entries = entries.len(), "Refreshed global configuration");
        Ok(entries.len())
    }

    async fn run_cycle(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        self.status.set_phase(SyncPhase::Pushing);
        self.push_phase(&mut report).await?;

        self.status.set_phase(SyncPhase::Pulling);
        let after = self.store.pull_cursor()?;
        let page = self
            .backend
            .pull(PullScope::User {
                user_id: self.store.identity().user_id.clone(),
                after,
            })
            .await?;
        debug!(records = page.records.len(), after, "Pulled remote changes");

        self.status.set_phase(SyncPhase::Resolving);
        self.resolve_phase(&page, &mut report)?;

        Ok(report)
    }

    async fn run_force_pull(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        self.status.set_phase(SyncPhase::Pulling);
        let page = self.backend.pull(PullScope::All { after: 0 }).await?;

        self.status.set_phase(SyncPhase::Resolving);
        self.resolve_phase(&page, &mut report)?;

        Ok(report)
    }

    /// Drain due outbox operations in enqueue order
    ///
    /// A failed operation is rescheduled with backoff and blocks only the
    /// operations queued behind it for the same record; everything else
    /// keeps flowing.
    async fn push_phase(&self, report: &mut SyncReport) -> Result<()> {
        let user_id = self.store.identity().user_id.clone();
        let mut blocked: HashSet<(Entity, RecordId)> = HashSet::new();

        loop {
            let now = self.store.now_ms();
            let ready: Vec<_> = self
                .store
                .due_operations(now, self.options.push_batch)?
                .into_iter()
                .filter(|op| !blocked.contains(&(op.entity, op.record_id)))
                .collect();
            if ready.is_empty() {
                break;
            }

            let response = self.backend.push(&user_id, &ready).await?;
            let acked: HashSet<String> = response.acked.into_iter().collect();
            let failed: HashMap<String, String> = response
                .failed
                .into_iter()
                .map(|failure| (failure.op_id, failure.message))
                .collect();

            let mut progress = false;
            for op in &ready {
                if acked.contains(&op.op_id) {
                    self.store.ack_operation(&op.op_id)?;
                    report.pushed += 1;
                    progress = true;
                    continue;
                }

                let message = failed
                    .get(&op.op_id)
                    .cloned()
                    .unwrap_or_else(|| "Not acknowledged".to_string());
                warn!(
                    entity = %op.entity,
                    record_id = %op.record_id,
                    attempts = op.attempts + 1,
                    "Push rejected: {message}"
                );

                let retry_at = now + db::backoff_delay_ms(op.attempts);
                self.store.fail_operation(&op.op_id, retry_at, &message)?;
                self.store.defer_record(op.entity, op.record_id, retry_at)?;
                blocked.insert((op.entity, op.record_id));
                report.push_failures += 1;
            }

            if !progress {
                break;
            }
        }
        Ok(())
    }

    fn resolve_phase(&self, page: &PullResponse, report: &mut SyncReport) -> Result<()> {
        report.pulled += page.records.len();

        let mut max_synced_at = 0;
        for remote in &page.records {
            let local = self.store.record_meta(remote.entity, remote.id)?;
            match resolver::resolve(local.as_ref(), &remote.meta) {
                Resolution::RemoteWins => {
                    self.store.apply_remote(remote)?;
                    report.applied += 1;
                }
                Resolution::KeepLocal => {
                    debug!(entity = %remote.entity, id = %remote.id, "Local copy is newer, keeping it");
                }
            }
            max_synced_at = max_synced_at.max(remote.synced_at);
        }

        // Advance only after the whole page is on disk; a crash mid-page
        // re-pulls it, and resolution makes replays harmless.
        self.store
            .advance_pull_cursor(page.cursor.max(max_synced_at))?;
        Ok(())
    }
}

/// Clears the in-flight flag even when a cycle errors or is cancelled
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then_some(Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Run cycles automatically: once at startup, whenever connectivity
/// returns, on the optional interval, and with backoff after failures
///
/// The task runs until aborted; dropping the handle does not stop it.
pub fn spawn_auto_sync(
    dispatcher: Arc<SyncDispatcher>,
    every: Option<Duration>,
) -> JoinHandle<()> {
    let mut online = dispatcher.monitor.subscribe();
    tokio::spawn(async move {
        let mut failures: i64 = 0;
        let mut next_delay = Some(Duration::ZERO);

        loop {
            let wait = async {
                match next_delay.or(every) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                () = wait => {}
                changed = online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if !*online.borrow_and_update() {
                        // Hold until connectivity returns.
                        next_delay = None;
                        continue;
                    }
                }
            }

            match dispatcher.sync().await {
                Ok(_) => {
                    failures = 0;
                    next_delay = None;
                }
                Err(e) => {
                    let delay = Duration::from_millis(
                        u64::try_from(db::backoff_delay_ms(failures)).unwrap_or(60_000),
                    );
                    failures += 1;
                    warn!("Sync failed, retrying in {delay:?}: {e}");
                    next_delay = Some(delay);
                }
            }
        }
    })
}
