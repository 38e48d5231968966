//! tally-core - Core library for Tally
//!
//! This crate contains the shared models, the local SQLite store with its
//! outbox, and the sync engine used by all Tally interfaces. Writes always
//! land locally first; the sync layer replicates them when a backend is
//! reachable.

pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use ledger::Ledger;
pub use models::{Entity, RecordId};
