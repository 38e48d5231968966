//! Local persistence: SQLite store, durable outbox, configuration cache

mod config_cache;
mod migrations;
mod outbox;
mod store;

pub use outbox::{OpAction, PendingOperation};
pub use store::{Batch, DeviceIdentity, Store};

pub(crate) use outbox::backoff_delay_ms;

#[cfg(test)]
pub(crate) use store::Clock;
