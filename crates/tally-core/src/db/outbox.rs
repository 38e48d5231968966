//! Durable queue of local operations awaiting push
//!
//! Rows are written in the same transaction as the data they describe and
//! removed only when the backend acknowledges them, so pending work
//! survives crashes and restarts. `seq` preserves enqueue order; the
//! dispatcher keeps that order per record id even across retries.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Entity, RecordId};

/// Retry delays after consecutive failures of one operation
const BACKOFF_LADDER_MS: [i64; 3] = [2_000, 5_000, 15_000];
/// Delay used once the ladder is exhausted; retries continue at this pace
const BACKOFF_CAP_MS: i64 = 60_000;

/// Delay before the next attempt of an operation that has failed
/// `attempts` times already
pub(crate) fn backoff_delay_ms(attempts: i64) -> i64 {
    usize::try_from(attempts)
        .ok()
        .and_then(|n| BACKOFF_LADDER_MS.get(n).copied())
        .unwrap_or(BACKOFF_CAP_MS)
}

/// What a pending operation did to its record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpAction {
    Create,
    Update,
    Delete,
}

impl OpAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OpAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("Unknown action: {other}"))),
        }
    }
}

/// One not-yet-acknowledged local operation
///
/// `payload` is the full record snapshot at the time of the write, so a
/// later push replays exactly what the user saw, not what the row has
/// since become.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    /// Enqueue order, assigned by SQLite
    pub seq: i64,
    /// Stable operation id, used for acknowledgement
    pub op_id: String,
    pub entity: Entity,
    pub record_id: RecordId,
    pub action: OpAction,
    pub payload: serde_json::Value,
    /// When the operation was enqueued (Unix ms)
    pub created_at: i64,
    /// Failed push attempts so far
    pub attempts: i64,
    /// Earliest time the dispatcher may try again (Unix ms)
    pub next_attempt_at: i64,
    /// Message from the most recent failure
    pub last_error: Option<String>,
}

pub(crate) fn enqueue(
    conn: &Connection,
    entity: Entity,
    record_id: RecordId,
    action: OpAction,
    payload: &serde_json::Value,
    created_at: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO outbox (op_id, entity, record_id, action, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            Uuid::now_v7().to_string(),
            entity.table(),
            record_id.as_str(),
            action.as_str(),
            payload.to_string(),
            created_at,
        ],
    )?;
    Ok(())
}

/// Operations eligible to push at `now`, in enqueue order
pub(crate) fn due(conn: &Connection, now: i64, limit: usize) -> Result<Vec<PendingOperation>> {
    let mut stmt = conn.prepare(
        "SELECT seq, op_id, entity, record_id, action, payload,
                created_at, attempts, next_attempt_at, last_error
         FROM outbox
         WHERE next_attempt_at <= ?1
         ORDER BY seq
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(
        params![now, i64::try_from(limit).unwrap_or(i64::MAX)],
        op_from_row,
    )?;

    let mut ops = Vec::new();
    for row in rows {
        ops.push(row?);
    }
    Ok(ops)
}

/// Remove an acknowledged operation; unknown ids are ignored
pub(crate) fn ack(conn: &Connection, op_id: &str) -> Result<()> {
    conn.execute("DELETE FROM outbox WHERE op_id = ?", [op_id])?;
    Ok(())
}

/// Record a failed attempt and schedule the retry
pub(crate) fn reschedule(
    conn: &Connection,
    op_id: &str,
    next_attempt_at: i64,
    error: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE outbox
         SET attempts = attempts + 1, next_attempt_at = ?2, last_error = ?3
         WHERE op_id = ?1",
        params![op_id, next_attempt_at, error],
    )?;
    Ok(())
}

/// Hold every queued operation for a record back to `not_before`
///
/// Does not count an attempt against them. Ties in `next_attempt_at` are
/// broken by `seq` when operations come due, so the failed operation still
/// replays before the ones queued behind it.
pub(crate) fn defer_record(
    conn: &Connection,
    entity: Entity,
    record_id: RecordId,
    not_before: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE outbox SET next_attempt_at = MAX(next_attempt_at, ?3)
         WHERE entity = ?1 AND record_id = ?2",
        params![entity.table(), record_id.as_str(), not_before],
    )?;
    Ok(())
}

pub(crate) fn pending_count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

fn op_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingOperation> {
    let entity: String = row.get(2)?;
    let entity = entity.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
    })?;

    let record_id: String = row.get(3)?;
    let record_id = record_id.parse().map_err(|e: uuid::Error| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
    })?;

    let action: String = row.get(4)?;
    let action = action.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
    })?;

    let payload: String = row.get(5)?;
    let payload = serde_json::from_str(&payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
    })?;

    Ok(PendingOperation {
        seq: row.get(0)?,
        op_id: row.get(1)?,
        entity,
        record_id,
        action,
        payload,
        created_at: row.get(6)?,
        attempts: row.get(7)?,
        next_attempt_at: row.get(8)?,
        last_error: row.get(9)?,
    })
}
