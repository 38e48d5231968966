//! Offline-first sync engine
//!
//! Local writes land immediately and queue in the outbox; the dispatcher
//! pushes them when connectivity allows, pulls what other devices wrote,
//! and resolves divergence with last-writer-wins metadata. Progress is
//! published on a watch channel as [`SyncStatus`] snapshots.

mod backend;
mod dispatcher;
mod monitor;
mod resolver;
mod status;

#[cfg(test)]
mod tests;

pub use backend::{
    BackendError, BackendErrorKind, HttpBackend, MemoryBackend, PullResponse, PullScope,
    PushFailure, PushResponse, RemoteBackend,
};
pub use dispatcher::{spawn_auto_sync, SyncDispatcher, SyncOptions, SyncReport};
pub use monitor::NetworkMonitor;
pub use resolver::{resolve, Resolution};
pub use status::{StatusPublisher, SyncPhase, SyncStatus};
