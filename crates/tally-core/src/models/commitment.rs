//! Commitment model

use std::fmt;
use std::str::FromStr;

use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::record::{id_from_row, Entity, RecordId, SyncMeta, SyncRecord};

/// Which way the money is owed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentDirection {
    /// Someone owes the user
    Owed,
    /// The user owes someone
    Owing,
}

impl CommitmentDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owed => "owed",
            Self::Owing => "owing",
        }
    }
}

impl fmt::Display for CommitmentDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitmentDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owed" => Ok(Self::Owed),
            "owing" => Ok(Self::Owing),
            other => Err(Error::InvalidInput(format!(
                "Unknown commitment direction: {other}"
            ))),
        }
    }
}

/// An outstanding obligation to or from a counterparty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    /// Unique identifier
    pub id: RecordId,
    /// Sync metadata
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Who the obligation is with
    pub counterparty: String,
    /// Amount in minor units (always positive; direction carries the sign)
    pub amount: i64,
    /// Direction of the obligation
    pub direction: CommitmentDirection,
    /// Optional due date (Unix ms)
    pub due_at: Option<i64>,
    /// Whether the commitment has been settled
    pub settled: bool,
    /// When it was settled (Unix ms)
    pub settled_at: Option<i64>,
}

impl Commitment {
    /// Create a new open commitment
    #[must_use]
    pub fn new(
        counterparty: impl Into<String>,
        amount: i64,
        direction: CommitmentDirection,
    ) -> Self {
        Self {
            id: RecordId::new(),
            meta: SyncMeta::unstamped(),
            counterparty: counterparty.into(),
            amount,
            direction,
            due_at: None,
            settled: false,
            settled_at: None,
        }
    }

    /// Attach a due date
    #[must_use]
    pub const fn with_due_at(mut self, due_at: i64) -> Self {
        self.due_at = Some(due_at);
        self
    }
}

impl SyncRecord for Commitment {
    const ENTITY: Entity = Entity::Commitment;

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
            "counterparty",
            "amount",
            "direction",
            "due_at",
            "settled",
            "settled_at",
        ]
    }

    fn domain_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.counterparty.clone()),
            SqlValue::from(self.amount),
            SqlValue::from(self.direction.as_str().to_string()),
            SqlValue::from(self.due_at),
            SqlValue::from(i64::from(self.settled)),
            SqlValue::from(self.settled_at),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let direction: String = row.get(8)?;
        let direction = direction.parse().map_err(|e: Error| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Self {
            id: id_from_row(row, 0)?,
            meta: SyncMeta::from_row(row)?,
            counterparty: row.get(6)?,
            amount: row.get(7)?,
            direction,
            due_at: row.get(9)?,
            settled: row.get::<_, i64>(10)? != 0,
            settled_at: row.get(11)?,
        })
    }
}
