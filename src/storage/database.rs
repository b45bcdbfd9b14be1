//! SQLite Database
//!
//! Conversation history storage using rusqlite with r2d2 connection pooling.
//! Two tables: `sessions` and `turns`. Turns are keyed by
//! `(session_id, seq)` where `seq` is assigned inside the appending
//! transaction, so stored order is append order.

use std::path::{Path, PathBuf};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::utils::error::{AppError, AppResult};

/// Raw session row from the database
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub id: String,
    pub created_at: String,
    pub closed_at: Option<String>,
    pub turn_count: i64,
}

/// Raw turn row from the database
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRow {
    pub seq: i64,
    pub role: String,
    /// JSON-encoded turn content.
    pub content: String,
    pub created_at: String,
}

/// Row counts for the stats endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryStats {
    pub sessions: i64,
    pub turns: i64,
}

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database service for managing SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    path: Option<PathBuf>,
}

impl Database {
    /// Create an in-memory database for testing.
    ///
    /// The pool holds a single connection; every in-memory connection is a
    /// separate database.
    pub fn new_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool, path: None };
        db.init_schema()?;
        Ok(db)
    }

    /// Open (or create) the database file at `path` in WAL mode.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA foreign_keys = ON;",
            )
        });
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self {
            pool,
            path: Some(path.to_path_buf()),
        };
        db.init_schema()?;
        tracing::info!(path = %path.display(), "history database opened");
        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                closed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (session_id, seq)
            );

            CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, seq);",
        )?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// File backing the database; `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check if the database is healthy
    pub fn is_healthy(&self) -> bool {
        if let Ok(conn) = self.pool.get() {
            conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
        } else {
            false
        }
    }

    /// Insert a session row. Returns false when the id already exists.
    pub fn insert_session(&self, id: &str, created_at: &str) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO sessions (id, created_at) VALUES (?1, ?2)",
            params![id, created_at],
        )?;
        Ok(inserted == 1)
    }

    pub fn get_session(&self, id: &str) -> AppResult<Option<SessionRow>> {
        let conn = self.get_connection()?;
        let row = conn
            .query_row(
                "SELECT s.id, s.created_at, s.closed_at,
                        (SELECT COUNT(*) FROM turns t WHERE t.session_id = s.id)
                 FROM sessions s WHERE s.id = ?1",
                params![id],
                |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        closed_at: row.get(2)?,
                        turn_count: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Mark a session closed. Returns false when the id does not exist.
    /// Closing twice keeps the first timestamp.
    pub fn close_session(&self, id: &str, closed_at: &str) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let exists: bool = conn
            .query_row("SELECT 1 FROM sessions WHERE id = ?1", params![id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Ok(false);
        }
        conn.execute(
            "UPDATE sessions SET closed_at = ?2 WHERE id = ?1 AND closed_at IS NULL",
            params![id, closed_at],
        )?;
        Ok(true)
    }

    /// Append one turn, creating the session row if needed.
    ///
    /// Sequence assignment and the insert share one immediate transaction.
    /// Returns the assigned sequence number.
    pub fn append_turn(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        created_at: &str,
    ) -> AppResult<i64> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT OR IGNORE INTO sessions (id, created_at) VALUES (?1, ?2)",
            params![session_id, created_at],
        )?;
        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM turns WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO turns (session_id, seq, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, seq, role, content, created_at],
        )?;
        tx.commit()?;
        Ok(seq)
    }

    /// All turns of a session in append order.
    pub fn load_turns(&self, session_id: &str) -> AppResult<Vec<TurnRow>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT seq, role, content, created_at FROM turns
             WHERE session_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok(TurnRow {
                    seq: row.get(0)?,
                    role: row.get(1)?,
                    content: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> AppResult<HistoryStats> {
        let conn = self.get_connection()?;
        let sessions = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        let turns = conn.query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))?;
        Ok(HistoryStats { sessions, turns })
    }

    /// Size of the database file (plus WAL) in bytes.
    pub fn file_size_bytes(&self) -> u64 {
        let Some(path) = &self.path else {
            return 0;
        };
        let wal = PathBuf::from(format!("{}-wal", path.display()));
        [path.as_path(), wal.as_path()]
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: &str = "2026-01-01T00:00:00+00:00";

    #[test]
    fn test_schema_is_idempotent() {
        let db = Database::new_in_memory().unwrap();
        db.init_schema().unwrap();
        assert!(db.is_healthy());
    }

    #[test]
    fn test_insert_and_get_session() {
        let db = Database::new_in_memory().unwrap();
        assert!(db.insert_session("s1", T0).unwrap());
        assert!(!db.insert_session("s1", T0).unwrap());

        let row = db.get_session("s1").unwrap().unwrap();
        assert_eq!(row.created_at, T0);
        assert_eq!(row.turn_count, 0);
        assert!(db.get_session("missing").unwrap().is_none());
    }

    #[test]
    fn test_append_assigns_increasing_seq() {
        let db = Database::new_in_memory().unwrap();
        let a = db.append_turn("s1", "user", r#"{"type":"text","text":"a"}"#, T0).unwrap();
        let b = db.append_turn("s1", "assistant", r#"{"type":"text","text":"b"}"#, T0).unwrap();
        let other = db.append_turn("s2", "user", r#"{"type":"text","text":"x"}"#, T0).unwrap();
        assert_eq!((a, b, other), (1, 2, 1));

        let turns = db.load_turns("s1").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, "user");
        assert_eq!(turns[1].seq, 2);
        assert_eq!(db.get_session("s1").unwrap().unwrap().turn_count, 2);
    }

    #[test]
    fn test_close_session() {
        let db = Database::new_in_memory().unwrap();
        assert!(!db.close_session("s1", T0).unwrap());
        db.insert_session("s1", T0).unwrap();
        assert!(db.close_session("s1", T0).unwrap());
        assert!(db.close_session("s1", "2026-02-01T00:00:00+00:00").unwrap());
        assert_eq!(db.get_session("s1").unwrap().unwrap().closed_at.as_deref(), Some(T0));
    }

    #[test]
    fn test_file_database_persists() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("history").join("chat_history.db");
        {
            let db = Database::open(&path).unwrap();
            db.append_turn("s1", "user", "{}", T0).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.load_turns("s1").unwrap().len(), 1);
        assert_eq!(db.stats().unwrap(), HistoryStats { sessions: 1, turns: 1 });
        assert!(db.file_size_bytes() > 0);
        assert_eq!(db.path(), Some(path.as_path()));
    }
}
