//! Local SQLite store with optimistic writes
//!
//! Every mutation stamps sync metadata and enqueues an outbox operation in
//! the same SQLite transaction, so a write that is visible locally is
//! guaranteed to reach the outbox, and vice versa. Reads hide tombstoned
//! rows; remote state arrives through [`Store::apply_remote`], which never
//! touches the outbox.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension};

use crate::db::outbox::{self, OpAction, PendingOperation};
use crate::db::{config_cache, migrations};
use crate::error::{Error, Result};
use crate::models::{
    Channel, Commitment, Entity, GlobalEntry, Plan, PlanComponent, RecordId, RemoteRecord,
    Settlement, SyncMeta, SyncRecord, Transaction, UserSettings, Wallet,
};
use crate::sync::StatusPublisher;
use crate::util;

const META_COLUMNS: [&str; 6] = [
    "id",
    "user_id",
    "device_id",
    "version",
    "updated_at",
    "is_deleted",
];

const PULL_CURSOR_KEY: &str = "pull_cursor";
const LAST_SYNC_AT_KEY: &str = "last_sync_at";

/// The user and device every local write is stamped with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub user_id: String,
    pub device_id: String,
}

impl DeviceIdentity {
    #[must_use]
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
        }
    }
}

/// Time source for metadata stamps; swapped for a fixed clock in tests
#[derive(Debug, Clone)]
pub(crate) enum Clock {
    System,
    #[cfg(test)]
    Fixed(std::sync::Arc<std::sync::atomic::AtomicI64>),
}

impl Clock {
    fn now_ms(&self) -> i64 {
        match self {
            Self::System => util::unix_timestamp_ms(),
            #[cfg(test)]
            Self::Fixed(at) => at.load(std::sync::atomic::Ordering::SeqCst),
        }
    }
}

/// Handle to the local database
///
/// Cheap to share behind an `Arc`; all connection access goes through an
/// internal mutex.
pub struct Store {
    conn: Mutex<Connection>,
    identity: DeviceIdentity,
    clock: Clock,
    status: StatusPublisher,
}

impl Store {
    /// Open (or create) the database at `path` and run migrations
    pub fn open(
        path: impl AsRef<Path>,
        identity: DeviceIdentity,
        status: StatusPublisher,
    ) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, identity, Clock::System, status)
    }

    /// Open an in-memory database, mainly for tests and dry runs
    pub fn open_in_memory(identity: DeviceIdentity, status: StatusPublisher) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, identity, Clock::System, status)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory_with_clock(
        identity: DeviceIdentity,
        status: StatusPublisher,
        clock: Clock,
    ) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, identity, clock, status)
    }

    fn from_connection(
        mut conn: Connection,
        identity: DeviceIdentity,
        clock: Clock,
        status: StatusPublisher,
    ) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;
        migrations::run(&mut conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            identity,
            clock,
            status,
        };
        // The outbox may still hold operations from a previous run.
        store.refresh_pending()?;
        Ok(store)
    }

    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub(crate) fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Run several writes as one transaction
    ///
    /// Either every write in the closure lands (data and outbox rows
    /// together) or none of them do.
    pub fn batch<R>(&self, f: impl FnOnce(&Batch<'_>) -> Result<R>) -> Result<R> {
        let mut conn = self.conn.lock();
        // Scoped so the transaction's borrow of the connection ends before
        // the pending count is recomputed below.
        let out = {
            let batch = Batch {
                tx: conn.transaction()?,
                identity: &self.identity,
                now: self.clock.now_ms(),
            };
            let out = f(&batch)?;
            batch.tx.commit()?;
            out
        };

        let pending = outbox::pending_count(&conn)?;
        self.status.set_pending(pending);
        Ok(out)
    }

    /// Create a record, stamping its metadata and enqueueing the operation
    pub fn create<T: SyncRecord>(&self, record: &mut T) -> Result<()> {
        self.batch(|batch| batch.create(record))
    }

    /// Update a record in place; the caller edits domain fields only
    pub fn update<T: SyncRecord>(&self, record: &mut T) -> Result<()> {
        self.batch(|batch| batch.update(record))
    }

    /// Tombstone a record; the row survives so the deletion can replicate
    pub fn soft_delete<T: SyncRecord>(&self, id: RecordId) -> Result<()> {
        self.batch(|batch| batch.soft_delete::<T>(id))
    }

    /// Fetch a live record by id
    pub fn get<T: SyncRecord>(&self, id: RecordId) -> Result<Option<T>> {
        let conn = self.conn.lock();
        Ok(fetch(&conn, id)?.filter(|record: &T| !record.meta().is_deleted))
    }

    /// List live records, most recently updated first
    pub fn list<T: SyncRecord>(&self) -> Result<Vec<T>> {
        let conn = self.conn.lock();
        list_live(&conn)
    }

    /// Sync metadata for a row, tombstoned or not
    pub fn record_meta(&self, entity: Entity, id: RecordId) -> Result<Option<SyncMeta>> {
        let conn = self.conn.lock();
        row_meta(&conn, entity, id)
    }

    /// Write a remote record over whatever is stored locally
    ///
    /// The envelope metadata is taken as-is: no stamping, no version bump,
    /// and nothing is enqueued. Callers decide the winner first.
    pub fn apply_remote(&self, remote: &RemoteRecord) -> Result<()> {
        let conn = self.conn.lock();
        match remote.entity {
            Entity::Wallet => put_remote::<Wallet>(&conn, remote),
            Entity::Channel => put_remote::<Channel>(&conn, remote),
            Entity::Transaction => put_remote::<Transaction>(&conn, remote),
            Entity::Commitment => put_remote::<Commitment>(&conn, remote),
            Entity::Plan => put_remote::<Plan>(&conn, remote),
            Entity::PlanComponent => put_remote::<PlanComponent>(&conn, remote),
            Entity::Settlement => put_remote::<Settlement>(&conn, remote),
            Entity::Settings => put_remote::<UserSettings>(&conn, remote),
        }
    }

    /// Operations whose retry time has come, oldest first
    pub fn due_operations(&self, now: i64, limit: usize) -> Result<Vec<PendingOperation>> {
        let conn = self.conn.lock();
        outbox::due(&conn, now, limit)
    }

    /// Number of operations waiting to be pushed
    pub fn pending_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        outbox::pending_count(&conn)
    }

    /// Drop an operation the backend has acknowledged
    pub fn ack_operation(&self, op_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        outbox::ack(&conn, op_id)?;
        self.status.set_pending(outbox::pending_count(&conn)?);
        Ok(())
    }

    /// Record a failed push attempt and when to retry it
    pub fn fail_operation(&self, op_id: &str, next_attempt_at: i64, error: &str) -> Result<()> {
        let conn = self.conn.lock();
        outbox::reschedule(&conn, op_id, next_attempt_at, error)
    }

    /// Hold every queued operation for one record back to `not_before`
    ///
    /// Used after a push failure so operations queued behind the failing
    /// one replay in order once it succeeds.
    pub fn defer_record(&self, entity: Entity, record_id: RecordId, not_before: i64) -> Result<()> {
        let conn = self.conn.lock();
        outbox::defer_record(&conn, entity, record_id, not_before)
    }

    /// Highest backend `synced_at` this device has fully applied
    pub fn pull_cursor(&self) -> Result<i64> {
        let conn = self.conn.lock();
        read_cursor(&conn)
    }

    /// Advance the pull cursor; stale values are ignored
    pub fn advance_pull_cursor(&self, cursor: i64) -> Result<()> {
        let conn = self.conn.lock();
        if cursor > read_cursor(&conn)? {
            state_set(&conn, PULL_CURSOR_KEY, &cursor.to_string())?;
        }
        Ok(())
    }

    /// When the last clean sync cycle finished (Unix ms)
    pub fn last_sync_at(&self) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let value = state_get(&conn, LAST_SYNC_AT_KEY)?;
        value
            .map(|raw| {
                raw.parse()
                    .map_err(|e| Error::Database(format!("Corrupt last_sync_at: {e}")))
            })
            .transpose()
    }

    pub fn set_last_sync_at(&self, at: i64) -> Result<()> {
        let conn = self.conn.lock();
        state_set(&conn, LAST_SYNC_AT_KEY, &at.to_string())
    }

    /// Replace the shared configuration cache wholesale
    pub fn replace_global_config(&self, entries: &[GlobalEntry]) -> Result<()> {
        let mut conn = self.conn.lock();
        config_cache::replace(&mut conn, entries, self.clock.now_ms())
    }

    pub fn global_entry(&self, key: &str) -> Result<Option<GlobalEntry>> {
        let conn = self.conn.lock();
        config_cache::get(&conn, key)
    }

    pub fn global_entries(&self) -> Result<Vec<GlobalEntry>> {
        let conn = self.conn.lock();
        config_cache::list(&conn)
    }

    fn refresh_pending(&self) -> Result<()> {
        let conn = self.conn.lock();
        self.status.set_pending(outbox::pending_count(&conn)?);
        Ok(())
    }
}

/// A group of writes committed as one SQLite transaction
pub struct Batch<'a> {
    tx: rusqlite::Transaction<'a>,
    identity: &'a DeviceIdentity,
    now: i64,
}

impl Batch<'_> {
    /// Insert a new record; fails if a live row with this id exists
    ///
    /// Creating over a tombstone resurrects the id and continues its
    /// version chain, so the create outranks the earlier deletion.
    pub fn create<T: SyncRecord>(&self, record: &mut T) -> Result<()> {
        let id = record.id();
        let version = match row_meta(&self.tx, T::ENTITY, id)? {
            Some(prior) if !prior.is_deleted => {
                return Err(Error::AlreadyExists(format!("{} {id}", T::ENTITY)));
            }
            Some(prior) => prior.version + 1,
            None => 1,
        };

        let meta = record.meta_mut();
        meta.user_id = self.identity.user_id.clone();
        meta.device_id = self.identity.device_id.clone();
        meta.version = version;
        meta.updated_at = self.now;
        meta.is_deleted = false;

        upsert(&self.tx, record)?;
        self.enqueue(OpAction::Create, record)
    }

    /// Write back an edited record; fails if the row is missing or deleted
    pub fn update<T: SyncRecord>(&self, record: &mut T) -> Result<()> {
        let id = record.id();
        let prior = row_meta(&self.tx, T::ENTITY, id)?
            .filter(|meta| !meta.is_deleted)
            .ok_or_else(|| Error::NotFound(format!("{} {id}", T::ENTITY)))?;

        let meta = record.meta_mut();
        meta.user_id = prior.user_id;
        meta.device_id = self.identity.device_id.clone();
        meta.version = prior.version + 1;
        meta.updated_at = self.now;
        meta.is_deleted = false;

        upsert(&self.tx, record)?;
        self.enqueue(OpAction::Update, record)
    }

    /// Tombstone a record, shipping the full snapshot as the payload
    pub fn soft_delete<T: SyncRecord>(&self, id: RecordId) -> Result<()> {
        let mut record: T = fetch(&self.tx, id)?
            .filter(|record: &T| !record.meta().is_deleted)
            .ok_or_else(|| Error::NotFound(format!("{} {id}", T::ENTITY)))?;

        let meta = record.meta_mut();
        meta.device_id = self.identity.device_id.clone();
        meta.version += 1;
        meta.updated_at = self.now;
        meta.is_deleted = true;

        upsert(&self.tx, &record)?;
        self.enqueue(OpAction::Delete, &record)
    }

    /// Fetch a live record inside this transaction
    pub fn get<T: SyncRecord>(&self, id: RecordId) -> Result<Option<T>> {
        Ok(fetch(&self.tx, id)?.filter(|record: &T| !record.meta().is_deleted))
    }

    /// List live records inside this transaction
    pub fn list<T: SyncRecord>(&self) -> Result<Vec<T>> {
        list_live(&self.tx)
    }

    fn enqueue<T: SyncRecord>(&self, action: OpAction, record: &T) -> Result<()> {
        let payload = serde_json::to_value(record)?;
        outbox::enqueue(&self.tx, T::ENTITY, record.id(), action, &payload, self.now)
    }
}

fn column_list<T: SyncRecord>() -> String {
    let mut columns = META_COLUMNS.join(", ");
    for column in T::domain_columns() {
        columns.push_str(", ");
        columns.push_str(column);
    }
    columns
}

fn upsert<T: SyncRecord>(conn: &Connection, record: &T) -> Result<()> {
    let placeholders = vec!["?"; META_COLUMNS.len() + T::domain_columns().len()].join(", ");
    let sql = format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({placeholders})",
        T::ENTITY.table(),
        column_list::<T>(),
    );

    let meta = record.meta();
    let mut values: Vec<SqlValue> = vec![
        SqlValue::from(record.id().as_str()),
        SqlValue::from(meta.user_id.clone()),
        SqlValue::from(meta.device_id.clone()),
        SqlValue::from(meta.version),
        SqlValue::from(meta.updated_at),
        SqlValue::from(i64::from(meta.is_deleted)),
    ];
    values.extend(record.domain_values());

    conn.execute(&sql, rusqlite::params_from_iter(values))?;
    Ok(())
}

fn fetch<T: SyncRecord>(conn: &Connection, id: RecordId) -> Result<Option<T>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?",
        column_list::<T>(),
        T::ENTITY.table(),
    );
    let record = conn
        .query_row(&sql, [id.as_str()], |row| T::from_row(row))
        .optional()?;
    Ok(record)
}

fn list_live<T: SyncRecord>(conn: &Connection) -> Result<Vec<T>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE is_deleted = 0 ORDER BY updated_at DESC, id",
        column_list::<T>(),
        T::ENTITY.table(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| T::from_row(row))?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

pub(crate) fn row_meta(
    conn: &Connection,
    entity: Entity,
    id: RecordId,
) -> Result<Option<SyncMeta>> {
    let sql = format!(
        "SELECT user_id, device_id, version, updated_at, is_deleted FROM {} WHERE id = ?",
        entity.table(),
    );
    let meta = conn
        .query_row(&sql, [id.as_str()], |row| {
            Ok(SyncMeta {
                user_id: row.get(0)?,
                device_id: row.get(1)?,
                version: row.get(2)?,
                updated_at: row.get(3)?,
                is_deleted: row.get::<_, i64>(4)? != 0,
            })
        })
        .optional()?;
    Ok(meta)
}

fn put_remote<T: SyncRecord>(conn: &Connection, remote: &RemoteRecord) -> Result<()> {
    let mut record: T = serde_json::from_value(remote.payload.clone())?;
    if record.id() != remote.id {
        return Err(Error::InvalidInput(format!(
            "Remote payload id {} does not match envelope id {}",
            record.id(),
            remote.id,
        )));
    }
    *record.meta_mut() = remote.meta.clone();
    upsert(conn, &record)
}

fn state_get(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM sync_state WHERE key = ?", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

fn state_set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_state (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

fn read_cursor(conn: &Connection) -> Result<i64> {
    match state_get(conn, PULL_CURSOR_KEY)? {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::Database(format!("Corrupt pull cursor: {e}"))),
        None => Ok(0),
    }
}
