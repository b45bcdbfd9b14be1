//! Session Store
//!
//! `SessionStore` is the persistence seam for conversation history;
//! `SqliteSessionStore` implements it over `Database`. `SessionLocks`
//! serializes runs per session id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use analytics_agent_core::{validate_session_id, CoreError, CoreResult, SessionInfo, Turn, TurnContent, TurnRole};

use crate::storage::database::{Database, HistoryStats, SessionRow, TurnRow};
use crate::utils::error::{AppError, AppResult};

/// Append-only conversation history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session with a fresh server-generated id.
    async fn create(&self) -> AppResult<SessionInfo>;

    /// Return the session, creating it under `id` if it does not exist.
    async fn ensure(&self, id: &str) -> AppResult<SessionInfo>;

    async fn get(&self, id: &str) -> AppResult<Option<SessionInfo>>;

    /// Turns in append order. Unknown ids yield an empty history.
    async fn load(&self, id: &str) -> AppResult<Vec<Turn>>;

    /// Durably append one turn.
    async fn append(&self, id: &str, turn: &Turn) -> AppResult<()>;

    /// Mark the session closed. Returns false for unknown ids.
    async fn close(&self, id: &str) -> AppResult<bool>;

    async fn stats(&self) -> AppResult<HistoryStats>;
}

/// SQLite-backed session store.
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Database,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn blocking<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Database) -> AppResult<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db))
            .await
            .map_err(|e| AppError::database(format!("Task join error: {}", e)))?
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(&self) -> AppResult<SessionInfo> {
        self.blocking(|db| loop {
            let info = SessionInfo::new(uuid::Uuid::new_v4().to_string());
            if db.insert_session(&info.id, &info.created_at.to_rfc3339())? {
                tracing::info!(session_id = %info.id, "session created");
                return Ok(info);
            }
        })
        .await
    }

    async fn ensure(&self, id: &str) -> AppResult<SessionInfo> {
        validate_session_id(id)?;
        let id = id.to_string();
        self.blocking(move |db| {
            if db.insert_session(&id, &Utc::now().to_rfc3339())? {
                tracing::info!(session_id = %id, "session created on first use");
            }
            let row = db
                .get_session(&id)?
                .ok_or_else(|| AppError::database(format!("session {} vanished after insert", id)))?;
            Ok(session_info(row))
        })
        .await
    }

    async fn get(&self, id: &str) -> AppResult<Option<SessionInfo>> {
        let id = id.to_string();
        self.blocking(move |db| Ok(db.get_session(&id)?.map(session_info)))
            .await
    }

    async fn load(&self, id: &str) -> AppResult<Vec<Turn>> {
        let id = id.to_string();
        self.blocking(move |db| {
            let rows = db.load_turns(&id)?;
            Ok(rows
                .into_iter()
                .map(|row| {
                    decode_turn(&row).unwrap_or_else(|e| {
                        tracing::warn!(session_id = %id, seq = row.seq, error = %e, "unreadable turn in history");
                        unreadable_turn(&row, &e)
                    })
                })
                .collect())
        })
        .await
    }

    async fn append(&self, id: &str, turn: &Turn) -> AppResult<()> {
        let id = id.to_string();
        let role = turn.role.as_str();
        let content = serde_json::to_string(&turn.content)?;
        let created_at = turn.timestamp.to_rfc3339();
        self.blocking(move |db| {
            let seq = db.append_turn(&id, role, &content, &created_at)?;
            tracing::debug!(session_id = %id, seq, role, "turn appended");
            Ok(())
        })
        .await
    }

    async fn close(&self, id: &str) -> AppResult<bool> {
        let id = id.to_string();
        self.blocking(move |db| db.close_session(&id, &Utc::now().to_rfc3339()))
            .await
    }

    async fn stats(&self) -> AppResult<HistoryStats> {
        self.blocking(|db| db.stats()).await
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn session_info(row: SessionRow) -> SessionInfo {
    SessionInfo {
        id: row.id,
        created_at: parse_timestamp(&row.created_at),
        closed_at: row.closed_at.as_deref().map(parse_timestamp),
        turn_count: usize::try_from(row.turn_count).unwrap_or(0),
    }
}

fn decode_turn(row: &TurnRow) -> AppResult<Turn> {
    let role = TurnRole::parse(&row.role)
        .ok_or_else(|| AppError::database(format!("unknown role '{}'", row.role)))?;
    let content: TurnContent = serde_json::from_str(&row.content)?;
    Ok(Turn {
        role,
        content,
        timestamp: parse_timestamp(&row.created_at),
    })
}

/// Placeholder for a row that no longer decodes.
fn unreadable_turn(row: &TurnRow, err: &AppError) -> Turn {
    Turn {
        role: TurnRole::parse(&row.role).unwrap_or(TurnRole::Assistant),
        content: TurnContent::Unreadable {
            error: format!("turn {} could not be decoded: {}", row.seq, err),
        },
        timestamp: parse_timestamp(&row.created_at),
    }
}

// ============================================================================
// SessionLocks
// ============================================================================

/// Held for the duration of one run on a session.
pub type SessionGuard = OwnedMutexGuard<()>;

/// At most one in-flight run per session id.
///
/// A second request waits up to `wait` for the running one to finish and
/// then fails with `SessionBusy`.
pub struct SessionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
    wait: Duration,
}

impl SessionLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            wait,
        }
    }

    pub async fn acquire(&self, session_id: &str) -> CoreResult<SessionGuard> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(self.wait, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(CoreError::SessionBusy(format!(
                "session {} already has a request in progress",
                session_id
            ))),
        }
    }

    /// Drop locks nobody holds or waits on. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
