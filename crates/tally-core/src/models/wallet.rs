//! Wallet model

use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

use super::record::{id_from_row, Entity, RecordId, SyncMeta, SyncRecord};

/// A wallet holding funds in a single currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique identifier
    pub id: RecordId,
    /// Sync metadata
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Display name
    pub name: String,
    /// ISO currency code (e.g. "PHP", "USD")
    pub currency: String,
    /// Balance at creation, in minor units
    pub opening_balance: i64,
}

impl Wallet {
    /// Create a new wallet
    #[must_use]
    pub fn new(name: impl Into<String>, currency: impl Into<String>, opening_balance: i64) -> Self {
        Self {
            id: RecordId::new(),
            meta: SyncMeta::unstamped(),
            name: name.into(),
            currency: currency.into(),
            opening_balance,
        }
    }
}

impl SyncRecord for Wallet {
    const ENTITY: Entity = Entity::Wallet;

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
        &["name", "currency", "opening_balance"]
    }

    fn domain_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.name.clone()),
            SqlValue::from(self.currency.clone()),
            SqlValue::from(self.opening_balance),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: id_from_row(row, 0)?,
            meta: SyncMeta::from_row(row)?,
            name: row.get(6)?,
            currency: row.get(7)?,
            opening_balance: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wallet_new() {
        let wallet = Wallet::new("Cash", "PHP", 10_000);
        assert_eq!(wallet.name, "Cash");
        assert_eq!(wallet.currency, "PHP");
        assert_eq!(wallet.opening_balance, 10_000);
        assert_eq!(wallet.meta.version, 0);
        assert!(!wallet.meta.is_deleted);
    }

    #[test]
    fn test_wallet_payload_is_flat() {
        let wallet = Wallet::new("Cash", "PHP", 0);
        let value = serde_json::to_value(&wallet).unwrap();
        assert!(value["user_id"].is_string());
        assert!(value["version"].is_number());
        assert_eq!(value["name"], "Cash");

        let back: Wallet = serde_json::from_value(value).unwrap();
        assert_eq!(back, wallet);
    }
}
