//! Base record shape shared by every synced entity
//!
//! Every entity row carries the same five metadata columns ([`SyncMeta`])
//! next to its domain fields; the sync engine works entirely off that
//! metadata plus a JSON snapshot of the full record.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::Value as SqlValue;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// A unique identifier for a synced record, using UUID v7 (time-sortable)
///
/// Ids are generated once on the creating device and never change, so the
/// same record is addressable from every replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Sync metadata carried by every entity row
///
/// Divergence between replicas is resolved from `(version, updated_at,
/// device_id)` alone; see the conflict resolver for the ordering rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMeta {
    /// Tenant that owns the record
    pub user_id: String,
    /// Device that made the last local write
    pub device_id: String,
    /// Incremented on every local mutation to this id; 1 on create
    pub version: i64,
    /// Authoritative ordering timestamp (Unix ms)
    pub updated_at: i64,
    /// Tombstone flag; rows are never physically removed
    pub is_deleted: bool,
}

impl SyncMeta {
    /// Placeholder metadata for freshly constructed records; the store
    /// stamps the real values when the record is written.
    pub(crate) fn unstamped() -> Self {
        Self {
            user_id: String::new(),
            device_id: String::new(),
            version: 0,
            updated_at: 0,
            is_deleted: false,
        }
    }

    /// Parse the metadata columns of a full entity row
    ///
    /// Entity rows always select columns in the order
    /// `id, user_id, device_id, version, updated_at, is_deleted, <domain...>`,
    /// so the metadata lives at indices 1 through 5.
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(1)?,
            device_id: row.get(2)?,
            version: row.get(3)?,
            updated_at: row.get(4)?,
            is_deleted: row.get::<_, i64>(5)? != 0,
        })
    }
}

/// The closed set of synced entity kinds and their table names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    #[serde(rename = "wallets")]
    Wallet,
    #[serde(rename = "channels")]
    Channel,
    #[serde(rename = "transactions")]
    Transaction,
    #[serde(rename = "commitments")]
    Commitment,
    #[serde(rename = "plans")]
    Plan,
    #[serde(rename = "plan_components")]
    PlanComponent,
    #[serde(rename = "settlements")]
    Settlement,
    #[serde(rename = "settings")]
    Settings,
}

impl Entity {
    /// All entity kinds, in schema order
    pub const ALL: [Self; 8] = [
        Self::Wallet,
        Self::Channel,
        Self::Transaction,
        Self::Commitment,
        Self::Plan,
        Self::PlanComponent,
        Self::Settlement,
        Self::Settings,
    ];

    /// The SQLite table backing this entity
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Wallet => "wallets",
            Self::Channel => "channels",
            Self::Transaction => "transactions",
            Self::Commitment => "commitments",
            Self::Plan => "plans",
            Self::PlanComponent => "plan_components",
            Self::Settlement => "settlements",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for Entity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|entity| entity.table() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown entity: {s}")))
    }
}

/// Storage and sync mapping implemented by every entity model
///
/// The serde shape doubles as the wire/outbox payload: metadata fields are
/// flattened next to the domain fields, so a payload deserializes straight
/// back into the typed record.
pub trait SyncRecord: Clone + Serialize + DeserializeOwned + Send + 'static {
    /// Entity kind of this record type
    const ENTITY: Entity;

    /// Record id
    fn id(&self) -> RecordId;

    /// Sync metadata
    fn meta(&self) -> &SyncMeta;

    /// Mutable sync metadata (stamped by the store)
    fn meta_mut(&mut self) -> &mut SyncMeta;

    /// Domain column names, in the order `domain_values` binds them
    fn domain_columns() -> &'static [&'static str];

    /// Domain column values, in `domain_columns` order
    fn domain_values(&self) -> Vec<SqlValue>;

    /// Parse a full row selected as
    /// `id, user_id, device_id, version, updated_at, is_deleted, <domain...>`
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

/// Parse a required id column
pub(crate) fn id_from_row(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<RecordId> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: uuid::Error| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse a nullable id column
pub(crate) fn opt_id_from_row(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<RecordId>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse().map_err(|e: uuid::Error| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    })
    .transpose()
}

/// Bind a nullable id column
pub(crate) fn opt_id_value(id: Option<RecordId>) -> SqlValue {
    match id {
        Some(id) => SqlValue::from(id.as_str()),
        None => SqlValue::Null,
    }
}

/// Wire envelope for a record travelling to or from the backend
///
/// `payload` is the full JSON snapshot of the typed record (metadata
/// included); the flattened metadata on the envelope lets the resolver
/// decide a winner without deserializing the payload. `synced_at` is
/// assigned by the backend when it accepts a row and is monotone per
/// backend, which makes it usable as an incremental pull cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub entity: Entity,
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: SyncMeta,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub synced_at: i64,
}

/// A shared, non-user-editable configuration entry
///
/// These bypass versioning and the outbox entirely; the configuration
/// cache overwrites them wholesale on every global pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalEntry {
    pub key: String,
    pub value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_id_unique() {
        let id1 = RecordId::new();
        let id2 = RecordId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_record_id_parse() {
        let id = RecordId::new();
        let parsed: RecordId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_entity_round_trip() {
        for entity in Entity::ALL {
            let parsed: Entity = entity.table().parse().unwrap();
            assert_eq!(entity, parsed);
        }
        assert!("nonsense".parse::<Entity>().is_err());
    }

    #[test]
    fn test_entity_serde_uses_table_names() {
        let json = serde_json::to_string(&Entity::PlanComponent).unwrap();
        assert_eq!(json, "\"plan_components\"");
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Entity::PlanComponent);
    }

    #[test]
    fn test_remote_record_flattens_meta() {
        let record = RemoteRecord {
            entity: Entity::Wallet,
            id: RecordId::new(),
            meta: SyncMeta {
                user_id: "u-1".into(),
                device_id: "d-1".into(),
                version: 3,
                updated_at: 42,
                is_deleted: false,
            },
            payload: serde_json::json!({"name": "Cash"}),
            synced_at: 7,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["entity"], "wallets");
        assert_eq!(value["user_id"], "u-1");
        assert_eq!(value["version"], 3);

        let back: RemoteRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
