//! Per-user settings model
//!
//! These sync like any other record (one row per user). Shared,
//! non-user-editable configuration lives in the configuration cache
//! instead and never goes through versioning.

use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

use super::record::{id_from_row, Entity, RecordId, SyncMeta, SyncRecord};

/// User-editable preferences that follow the user across devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Unique identifier
    pub id: RecordId,
    /// Sync metadata
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Preferred display currency
    pub currency: String,
    /// Day of month the budgeting period starts on (1..=28)
    pub month_start_day: i64,
}

impl UserSettings {
    /// Create new settings
    #[must_use]
    pub fn new(currency: impl Into<String>, month_start_day: i64) -> Self {
        Self {
            id: RecordId::new(),
            meta: SyncMeta::unstamped(),
            currency: currency.into(),
            month_start_day,
        }
    }
}

impl SyncRecord for UserSettings {
    const ENTITY: Entity = Entity::Settings;

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
        &["currency", "month_start_day"]
    }

    fn domain_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.currency.clone()),
            SqlValue::from(self.month_start_day),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: id_from_row(row, 0)?,
            meta: SyncMeta::from_row(row)?,
            currency: row.get(6)?,
            month_start_day: row.get(7)?,
        })
    }
}
