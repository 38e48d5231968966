//! Remote backend transport
//!
//! [`RemoteBackend`] is the seam between the sync engine and the server:
//! push the outbox, pull changed records after a cursor, and fetch shared
//! configuration. [`HttpBackend`] talks JSON over HTTP; [`MemoryBackend`]
//! is an in-process server used by tests, applying the same
//! last-writer-wins rule a real backend applies on write.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{OpAction, PendingOperation};
use crate::models::{Entity, GlobalEntry, RecordId, RemoteRecord, SyncMeta};
use crate::sync::resolver::{self, Resolution};

/// How a backend call failed, and whether retrying can help
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Transport-level failure; safe to retry later
    Network,
    /// The backend refused the request; the same payload will fail again
    Rejection,
    /// The caller lacks the privilege for this call
    Authorization,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Network => "network",
            Self::Rejection => "rejection",
            Self::Authorization => "authorization",
        })
    }
}

/// Error from a backend call
#[derive(Debug, Clone, Error)]
#[error("Backend {kind} error: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Network,
            message: message.into(),
        }
    }

    pub fn rejection(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Rejection,
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Authorization,
            message: message.into(),
        }
    }

    /// True when waiting and retrying the same call may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, BackendErrorKind::Network)
    }
}

/// What a pull should cover
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullScope {
    /// One user's records changed after the cursor
    User { user_id: String, after: i64 },
    /// Every record changed after the cursor, any tenant (privileged)
    All { after: i64 },
}

/// Per-operation outcome of a push
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Operations the backend consumed; drop them from the outbox
    pub acked: Vec<String>,
    /// Operations the backend could not take this time
    pub failed: Vec<PushFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushFailure {
    pub op_id: String,
    pub message: String,
}

/// A page of remote changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    pub records: Vec<RemoteRecord>,
    /// Cursor to resume from on the next pull
    pub cursor: i64,
}

/// Server side of the sync protocol
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Submit outbox operations in order; acknowledgement is per operation
    async fn push(
        &self,
        user_id: &str,
        ops: &[PendingOperation],
    ) -> Result<PushResponse, BackendError>;

    /// Fetch records changed after the scope's cursor
    async fn pull(&self, scope: PullScope) -> Result<PullResponse, BackendError>;

    /// Fetch the current shared configuration snapshot
    async fn global_config(&self) -> Result<Vec<GlobalEntry>, BackendError>;
}

/// JSON-over-HTTP backend
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

/// Outbox operation as it travels to the server; retry bookkeeping stays local
#[derive(Serialize)]
struct WireOp<'a> {
    op_id: &'a str,
    entity: Entity,
    record_id: RecordId,
    action: OpAction,
    payload: &'a serde_json::Value,
    created_at: i64,
}

impl<'a> From<&'a PendingOperation> for WireOp<'a> {
    fn from(op: &'a PendingOperation) -> Self {
        Self {
            op_id: &op.op_id,
            entity: op.entity,
            record_id: op.record_id,
            action: op.action,
            payload: &op.payload,
            created_at: op.created_at,
        }
    }
}

impl HttpBackend {
    /// Default per-request timeout so a stalled server cannot wedge a
    /// sync cycle.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::rejection(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let response = check_status(response)?;
        response
            .json()
            .await
            .map_err(|e| BackendError::rejection(format!("Malformed response: {e}")))
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
    {
        Err(BackendError::authorization(format!("HTTP {status}")))
    } else if status.is_server_error() {
        Err(BackendError::network(format!("HTTP {status}")))
    } else {
        Err(BackendError::rejection(format!("HTTP {status}")))
    }
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    async fn push(
        &self,
        user_id: &str,
        ops: &[PendingOperation],
    ) -> Result<PushResponse, BackendError> {
        let body: Vec<WireOp<'_>> = ops.iter().map(WireOp::from).collect();
        let response = self
            .client
            .post(self.url("sync/push"))
            .query(&[("user_id", user_id)])
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::network(e.to_string()))?;
        Self::read_json(response).await
    }

    async fn pull(&self, scope: PullScope) -> Result<PullResponse, BackendError> {
        let request = match &scope {
            PullScope::User { user_id, after } => self
                .client
                .get(self.url("sync/pull"))
                .query(&[("user_id", user_id.as_str()), ("after", &after.to_string())]),
            PullScope::All { after } => self
                .client
                .get(self.url("sync/pull"))
                .query(&[("scope", "all"), ("after", &after.to_string())]),
        };
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::network(e.to_string()))?;
        Self::read_json(response).await
    }

    async fn global_config(&self) -> Result<Vec<GlobalEntry>, BackendError> {
        let response = self
            .client
            .get(self.url("config/global"))
            .send()
            .await
            .map_err(|e| BackendError::network(e.to_string()))?;
        Self::read_json(response).await
    }
}

/// In-process backend with server-side last-writer-wins semantics
///
/// Stale pushes are acknowledged but not applied, exactly as a real
/// backend consumes an outdated operation without letting it clobber newer
/// state. Failure injection knobs cover the retry paths.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    fail_pushes: AtomicU32,
    fail_pulls: AtomicU32,
    push_delay: Mutex<Option<Duration>>,
}

#[derive(Default)]
struct MemoryState {
    rows: HashMap<(Entity, RecordId), RemoteRecord>,
    next_synced_at: i64,
    global: Vec<GlobalEntry>,
    rejected: HashSet<RecordId>,
    push_calls: u64,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as if another device had pushed it
    pub fn seed_record(&self, mut record: RemoteRecord) {
        let mut state = self.state.lock();
        state.next_synced_at += 1;
        record.synced_at = state.next_synced_at;
        state.rows.insert((record.entity, record.id), record);
    }

    #[must_use]
    pub fn record(&self, entity: Entity, id: RecordId) -> Option<RemoteRecord> {
        self.state.lock().rows.get(&(entity, id)).cloned()
    }

    #[must_use]
    pub fn records(&self) -> Vec<RemoteRecord> {
        let state = self.state.lock();
        let mut records: Vec<RemoteRecord> = state.rows.values().cloned().collect();
        records.sort_by_key(|row| row.synced_at);
        records
    }

    pub fn set_global(&self, entries: Vec<GlobalEntry>) {
        self.state.lock().global = entries;
    }

    /// Make pushes for this record fail until cleared
    pub fn reject_record(&self, id: RecordId) {
        self.state.lock().rejected.insert(id);
    }

    pub fn clear_rejections(&self) {
        self.state.lock().rejected.clear();
    }

    /// Fail the next `n` push calls with a network error
    pub fn fail_next_pushes(&self, n: u32) {
        self.fail_pushes.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` pull calls with a network error
    pub fn fail_next_pulls(&self, n: u32) {
        self.fail_pulls.store(n, Ordering::SeqCst);
    }

    /// Delay push calls, to widen the window where a cycle is in flight
    pub fn set_push_delay(&self, delay: Option<Duration>) {
        *self.push_delay.lock() = delay;
    }

    #[must_use]
    pub fn push_calls(&self) -> u64 {
        self.state.lock().push_calls
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    async fn push(
        &self,
        _user_id: &str,
        ops: &[PendingOperation],
    ) -> Result<PushResponse, BackendError> {
        let delay = *self.push_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.fail_pushes) {
            return Err(BackendError::network("injected push failure"));
        }

        let mut state = self.state.lock();
        state.push_calls += 1;

        let mut response = PushResponse::default();
        for op in ops {
            if state.rejected.contains(&op.record_id) {
                response.failed.push(PushFailure {
                    op_id: op.op_id.clone(),
                    message: "rejected by server".to_string(),
                });
                continue;
            }

            let meta: SyncMeta = match serde_json::from_value(op.payload.clone()) {
                Ok(meta) => meta,
                Err(e) => {
                    response.failed.push(PushFailure {
                        op_id: op.op_id.clone(),
                        message: format!("malformed payload: {e}"),
                    });
                    continue;
                }
            };

            let key = (op.entity, op.record_id);
            let current = state.rows.get(&key).map(|row| row.meta.clone());
            if resolver::resolve(current.as_ref(), &meta) == Resolution::RemoteWins {
                state.next_synced_at += 1;
                let synced_at = state.next_synced_at;
                state.rows.insert(
                    key,
                    RemoteRecord {
                        entity: op.entity,
                        id: op.record_id,
                        meta,
                        payload: op.payload.clone(),
                        synced_at,
                    },
                );
            }
            // A stale operation is consumed either way.
            response.acked.push(op.op_id.clone());
        }
        Ok(response)
    }

    async fn pull(&self, scope: PullScope) -> Result<PullResponse, BackendError> {
        if Self::take_failure(&self.fail_pulls) {
            return Err(BackendError::network("injected pull failure"));
        }

        let state = self.state.lock();
        let (user_filter, after) = match &scope {
            PullScope::User { user_id, after } => (Some(user_id.as_str()), *after),
            PullScope::All { after } => (None, *after),
        };

        let mut records: Vec<RemoteRecord> = state
            .rows
            .values()
            .filter(|row| row.synced_at > after)
            .filter(|row| user_filter.is_none_or(|user| row.meta.user_id == user))
            .cloned()
            .collect();
        records.sort_by_key(|row| row.synced_at);

        let cursor = records.last().map_or(after, |row| row.synced_at);
        Ok(PullResponse { records, cursor })
    }

    async fn global_config(&self) -> Result<Vec<GlobalEntry>, BackendError> {
        Ok(self.state.lock().global.clone())
    }
}
