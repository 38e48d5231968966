//! Plan, plan component, and settlement models
//!
//! A plan is drafted from components (planned line items), optionally
//! collects settlements (money contributed toward it), and is finalized
//! into real transactions in one atomic step.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::record::{id_from_row, Entity, RecordId, SyncMeta, SyncRecord};

/// Lifecycle state of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Finalized,
}

impl PlanStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "finalized" => Ok(Self::Finalized),
            other => Err(Error::InvalidInput(format!("Unknown plan status: {other}"))),
        }
    }
}

/// A planned spend drafted before the money moves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier
    pub id: RecordId,
    /// Sync metadata
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Display title
    pub title: String,
    /// Draft until finalized into transactions
    pub status: PlanStatus,
    /// Wallet the finalized transactions will hit
    pub wallet_id: RecordId,
}

impl Plan {
    /// Create a new draft plan
    #[must_use]
    pub fn new(title: impl Into<String>, wallet_id: RecordId) -> Self {
        Self {
            id: RecordId::new(),
            meta: SyncMeta::unstamped(),
            title: title.into(),
            status: PlanStatus::Draft,
            wallet_id,
        }
    }
}

impl SyncRecord for Plan {
    const ENTITY: Entity = Entity::Plan;

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
        &["title", "status", "wallet_id"]
    }

    fn domain_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.title.clone()),
            SqlValue::from(self.status.as_str().to_string()),
            SqlValue::from(self.wallet_id.as_str()),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(7)?;
        let status = status.parse().map_err(|e: Error| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Self {
            id: id_from_row(row, 0)?,
            meta: SyncMeta::from_row(row)?,
            title: row.get(6)?,
            status,
            wallet_id: id_from_row(row, 8)?,
        })
    }
}

/// A planned line item inside a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanComponent {
    /// Unique identifier
    pub id: RecordId,
    /// Sync metadata
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Plan this component belongs to
    pub plan_id: RecordId,
    /// Display label
    pub label: String,
    /// Signed amount in minor units
    pub amount: i64,
}

impl PlanComponent {
    /// Create a new component for a plan
    #[must_use]
    pub fn new(plan_id: RecordId, label: impl Into<String>, amount: i64) -> Self {
        Self {
            id: RecordId::new(),
            meta: SyncMeta::unstamped(),
            plan_id,
            label: label.into(),
            amount,
        }
    }
}

impl SyncRecord for PlanComponent {
    const ENTITY: Entity = Entity::PlanComponent;

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
        &["plan_id", "label", "amount"]
    }

    fn domain_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.plan_id.as_str()),
            SqlValue::from(self.label.clone()),
            SqlValue::from(self.amount),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: id_from_row(row, 0)?,
            meta: SyncMeta::from_row(row)?,
            plan_id: id_from_row(row, 6)?,
            label: row.get(7)?,
            amount: row.get(8)?,
        })
    }
}

/// Money contributed toward a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Unique identifier
    pub id: RecordId,
    /// Sync metadata
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Plan the contribution applies to
    pub plan_id: RecordId,
    /// Who contributed
    pub payer: String,
    /// Amount in minor units
    pub amount: i64,
    /// When the contribution was recorded (Unix ms)
    pub settled_at: i64,
}

impl Settlement {
    /// Record a contribution toward a plan, timestamped now
    #[must_use]
    pub fn new(plan_id: RecordId, payer: impl Into<String>, amount: i64) -> Self {
        Self {
            id: RecordId::new(),
            meta: SyncMeta::unstamped(),
            plan_id,
            payer: payer.into(),
            amount,
            settled_at: crate::util::unix_timestamp_ms(),
        }
    }
}

impl SyncRecord for Settlement {
    const ENTITY: Entity = Entity::Settlement;

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
        &["plan_id", "payer", "amount", "settled_at"]
    }

    fn domain_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.plan_id.as_str()),
            SqlValue::from(self.payer.clone()),
            SqlValue::from(self.amount),
            SqlValue::from(self.settled_at),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: id_from_row(row, 0)?,
            meta: SyncMeta::from_row(row)?,
            plan_id: id_from_row(row, 6)?,
            payer: row.get(7)?,
            amount: row.get(8)?,
            settled_at: row.get(9)?,
        })
    }
}
