//! SQLite-backed key-value storage.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// Schema for the key-value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-based storage implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::storage("Failed to create storage directory", e))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::storage(
        &format!("Failed to open database at {}", path.display()),
        e,
      )
    })?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| Error::storage("Failed to open in-memory database", e))?;
    Self::with_connection(conn)
  }

  /// Database path under the given data directory.
  pub fn path_in(data_dir: &Path) -> PathBuf {
    data_dir.join("localsync.db")
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.conn.lock().map_err(Error::poisoned)?;
    conn
      .execute_batch(KV_SCHEMA)
      .map_err(|e| Error::storage("Failed to run migrations", e))?;
    Ok(())
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.conn.lock().map_err(Error::poisoned)?;
    conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| Error::storage(&format!("Failed to read '{}'", key), e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.conn.lock().map_err(Error::poisoned)?;
    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value, written_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| Error::storage(&format!("Failed to write '{}'", key), e))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.conn.lock().map_err(Error::poisoned)?;
    conn
      .execute("DELETE FROM kv WHERE key = ?", params![key])
      .map_err(|e| Error::storage(&format!("Failed to remove '{}'", key), e))?;
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let conn = self.conn.lock().map_err(Error::poisoned)?;
    let mut stmt = conn
      .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
      .map_err(|e| Error::storage("Failed to prepare query", e))?;

    let keys = stmt
      .query_map(params![prefix], |row| row.get::<_, String>(0))
      .map_err(|e| Error::storage("Failed to list keys", e))?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(keys)
  }
}
