//! Payment channel model

use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

use super::record::{id_from_row, Entity, RecordId, SyncMeta, SyncRecord};

/// A payment channel money moves through (cash, a bank, an e-wallet)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Unique identifier
    pub id: RecordId,
    /// Sync metadata
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Display name
    pub name: String,
    /// Free-form kind, e.g. "cash", "bank", "ewallet"
    pub kind: String,
}

impl Channel {
    /// Create a new channel
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            meta: SyncMeta::unstamped(),
            name: name.into(),
            kind: kind.into(),
        }
    }
}

impl SyncRecord for Channel {
    const ENTITY: Entity = Entity::Channel;

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
        &["name", "kind"]
    }

    fn domain_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.name.clone()),
            SqlValue::from(self.kind.clone()),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: id_from_row(row, 0)?,
            meta: SyncMeta::from_row(row)?,
            name: row.get(6)?,
            kind: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_new() {
        let channel = Channel::new("GCash", "ewallet");
        assert_eq!(channel.name, "GCash");
        assert_eq!(channel.kind, "ewallet");
        assert_eq!(channel.meta.version, 0);
    }
}
