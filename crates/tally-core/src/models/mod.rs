//! Domain models for Tally

mod channel;
mod commitment;
mod plan;
mod record;
mod settings;
mod transaction;
mod wallet;

pub use channel::Channel;
pub use commitment::{Commitment, CommitmentDirection};
pub use plan::{Plan, PlanComponent, PlanStatus, Settlement};
pub use record::{Entity, GlobalEntry, RecordId, RemoteRecord, SyncMeta, SyncRecord};
pub use settings::UserSettings;
pub use transaction::Transaction;
pub use wallet::Wallet;
