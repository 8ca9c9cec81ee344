//! Durable storage for the signed-in identity and the transport cookie.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::board::types::Identity;
use crate::error::BoardError;

const IDENTITY_KEY: &str = "identity";
const COOKIE_KEY: &str = "session_cookie";

/// Trait for session storage backends.
///
/// Only the identity and the cookie are durable; loading and prompt flags
/// always start fresh.
pub trait SessionStorage: Send + Sync {
  fn load_identity(&self) -> Result<Option<Identity>, BoardError>;

  /// `None` forgets the stored identity.
  fn save_identity(&self, identity: Option<&Identity>) -> Result<(), BoardError>;

  fn load_cookie(&self) -> Result<Option<String>, BoardError>;

  fn save_cookie(&self, cookie: Option<&str>) -> Result<(), BoardError>;
}

/// Storage implementation that remembers nothing.
/// Used when session persistence is disabled.
pub struct NoopStorage;

impl SessionStorage for NoopStorage {
  fn load_identity(&self) -> Result<Option<Identity>, BoardError> {
    Ok(None)
  }

  fn save_identity(&self, _identity: Option<&Identity>) -> Result<(), BoardError> {
    Ok(())
  }

  fn load_cookie(&self) -> Result<Option<String>, BoardError> {
    Ok(None)
  }

  fn save_cookie(&self, _cookie: Option<&str>) -> Result<(), BoardError> {
    Ok(())
  }
}

/// SQLite-based session storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self, BoardError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        BoardError::Storage(format!("failed to create {}: {}", parent.display(), e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      BoardError::Storage(format!("failed to open {}: {}", path.display(), e))
    })?;
    Self::with_connection(conn)
  }

  /// Non-durable database, gone when dropped.
  pub fn in_memory() -> Result<Self, BoardError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, BoardError> {
    conn.execute_batch(SESSION_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> MutexGuard<'_, Connection> {
    self.conn.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn get(&self, key: &str) -> Result<Option<String>, BoardError> {
    let value = self
      .lock()
      .query_row(
        "SELECT value FROM session WHERE key = ?1",
        params![key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  fn put(&self, key: &str, value: Option<&str>) -> Result<(), BoardError> {
    let conn = self.lock();
    match value {
      Some(value) => {
        conn.execute(
          "INSERT INTO session (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
           ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
          params![key, value],
        )?;
      }
      None => {
        conn.execute("DELETE FROM session WHERE key = ?1", params![key])?;
      }
    }
    debug!(key, stored = value.is_some(), "session storage updated");
    Ok(())
  }
}

/// Default database path under the user data directory.
pub fn default_path() -> Result<PathBuf, BoardError> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| BoardError::Storage("could not determine data directory".to_string()))?;

  Ok(data_dir.join("bugboard").join("session.db"))
}

impl SessionStorage for SqliteStorage {
  fn load_identity(&self) -> Result<Option<Identity>, BoardError> {
    match self.get(IDENTITY_KEY)? {
      Some(json) => serde_json::from_str(&json)
        .map(Some)
        .map_err(|e| BoardError::Storage(format!("corrupt stored identity: {}", e))),
      None => Ok(None),
    }
  }

  fn save_identity(&self, identity: Option<&Identity>) -> Result<(), BoardError> {
    let json = identity
      .map(serde_json::to_string)
      .transpose()
      .map_err(|e| BoardError::Storage(format!("failed to serialize identity: {}", e)))?;
    self.put(IDENTITY_KEY, json.as_deref())
  }

  fn load_cookie(&self) -> Result<Option<String>, BoardError> {
    self.get(COOKIE_KEY)
  }

  fn save_cookie(&self, cookie: Option<&str>) -> Result<(), BoardError> {
    self.put(COOKIE_KEY, cookie)
  }
}

const SESSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
