//! Connectivity monitoring with debounced recovery
//!
//! The platform layer feeds raw connectivity observations in through
//! [`NetworkMonitor::report`]. Going offline is believed immediately, so
//! in-flight work can bail early. Coming back online must hold for the
//! debounce window first; flaky links otherwise trigger a sync storm of
//! half-finished cycles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::sync::StatusPublisher;

pub struct NetworkMonitor {
    status: StatusPublisher,
    state: watch::Sender<bool>,
    debounce: Duration,
    /// Bumped on every report; a pending recovery only lands if no newer
    /// observation arrived while it waited.
    generation: AtomicU64,
}

impl NetworkMonitor {
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

    /// Create a monitor that starts out assuming connectivity
    #[must_use]
    pub fn new(status: StatusPublisher, debounce: Duration) -> Arc<Self> {
        let (state, _rx) = watch::channel(true);
        Arc::new(Self {
            status,
            state,
            debounce,
            generation: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Watch the debounced online state
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Feed one connectivity observation
    pub fn report(self: &Arc<Self>, online: bool) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if !online {
            if self.is_online() {
                debug!("Connectivity lost");
            }
            self.apply(false);
            return;
        }

        if self.is_online() {
            return;
        }

        if self.debounce.is_zero() {
            self.apply(true);
            return;
        }

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(monitor.debounce).await;
            // Stale if anything else was observed in the meantime.
            if monitor.generation.load(Ordering::SeqCst) == generation {
                debug!("Connectivity restored");
                monitor.apply(true);
            }
        });
    }

    fn apply(&self, online: bool) {
        self.state.send_if_modified(|state| {
            let changed = *state != online;
            *state = online;
            changed
        });
        self.status.set_online(online);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(debounce: Duration) -> Arc<NetworkMonitor> {
        NetworkMonitor::new(StatusPublisher::new("user-1"), debounce)
    }

    #[tokio::test]
    async fn test_offline_applies_immediately() {
        let monitor = setup(Duration::from_millis(50));
        assert!(monitor.is_online());

        monitor.report(false);
        assert!(!monitor.is_online());
        assert!(!monitor.status.current().is_online);
    }

    #[tokio::test]
    async fn test_recovery_waits_for_debounce() {
        let monitor = setup(Duration::from_millis(50));
        monitor.report(false);

        monitor.report(true);
        assert!(!monitor.is_online());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(monitor.is_online());
        assert!(monitor.status.current().is_online);
    }

    #[tokio::test]
    async fn test_flap_during_debounce_stays_offline() {
        let monitor = setup(Duration::from_millis(50));
        monitor.report(false);

        monitor.report(true);
        monitor.report(false);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_zero_debounce_is_synchronous() {
        let monitor = setup(Duration::ZERO);
        monitor.report(false);
        monitor.report(true);
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_subscribers_wake_on_transition() {
        let monitor = setup(Duration::ZERO);
        let mut rx = monitor.subscribe();

        monitor.report(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());

        monitor.report(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }
}
