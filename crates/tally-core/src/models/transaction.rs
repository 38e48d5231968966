//! Transaction model

use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

use super::record::{
    id_from_row, opt_id_from_row, opt_id_value, Entity, RecordId, SyncMeta, SyncRecord,
};

/// A single ledger movement against a wallet
///
/// Amounts are signed minor units: expenses negative, income positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier
    pub id: RecordId,
    /// Sync metadata
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Wallet the movement applies to
    pub wallet_id: RecordId,
    /// Channel the money moved through, when known
    pub channel_id: Option<RecordId>,
    /// Signed amount in minor units
    pub amount: i64,
    /// When the movement happened (Unix ms)
    pub occurred_at: i64,
    /// Optional free-form note
    pub note: Option<String>,
    /// Plan this transaction was finalized from, if any
    pub plan_id: Option<RecordId>,
}

impl Transaction {
    /// Create a new transaction occurring now
    #[must_use]
    pub fn new(wallet_id: RecordId, amount: i64) -> Self {
        Self {
            id: RecordId::new(),
            meta: SyncMeta::unstamped(),
            wallet_id,
            channel_id: None,
            amount,
            occurred_at: crate::util::unix_timestamp_ms(),
            note: None,
            plan_id: None,
        }
    }

    /// Attach the channel the money moved through
    #[must_use]
    pub fn with_channel(mut self, channel_id: RecordId) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    /// Attach a note
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Mark this transaction as produced by finalizing a plan
    #[must_use]
    pub fn for_plan(mut self, plan_id: RecordId) -> Self {
        self.plan_id = Some(plan_id);
        self
    }
}

impl SyncRecord for Transaction {
    const ENTITY: Entity = Entity::Transaction;

    fn id(&self) -> RecordId {
        self.id
    }

    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }

    fn domain_columns() -> &'static [&'static str] {
        &[
            "wallet_id",
            "channel_id",
            "amount",
            "occurred_at",
            "note",
            "plan_id",
        ]
    }

    fn domain_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.wallet_id.as_str()),
            opt_id_value(self.channel_id),
            SqlValue::from(self.amount),
            SqlValue::from(self.occurred_at),
            SqlValue::from(self.note.clone()),
            opt_id_value(self.plan_id),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: id_from_row(row, 0)?,
            meta: SyncMeta::from_row(row)?,
            wallet_id: id_from_row(row, 6)?,
            channel_id: opt_id_from_row(row, 7)?,
            amount: row.get(8)?,
            occurred_at: row.get(9)?,
            note: row.get(10)?,
            plan_id: opt_id_from_row(row, 11)?,
        })
    }
}
